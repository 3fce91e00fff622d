// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Orders are the only aggregate. Storage and messaging sit behind the
// traits in crate::store and crate::messaging.
//
// ============================================================================

pub mod order;
