// libs/scheduling-cell/src/lib.rs
//
// Appointment scheduling engine: conflict detection, slot recommendation,
// and cancellation/waitlist coordination. Persistence is consumed through
// the repository traits in `repositories`; everything in `services` is
// business logic over those reads and writes.

pub mod handlers;
pub mod models;
pub mod repositories;
pub mod router;
pub mod services;
