// ============================================================================
// Order Domain - order record, status lifecycle and the controller
// ============================================================================
//
// - Value objects (OrderStatus and its transition rules)
// - Aggregate (Order record as stored and published)
// - Commands (DispatchOrder)
// - Events (OrderRef carried by queue messages)
// - Errors (OrderServiceError)
// - Controller (OrderController, the lifecycle operations)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod controller;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use controller::*;
