pub mod booking;
pub mod cancellation;
pub mod conflict;
pub mod recommender;
