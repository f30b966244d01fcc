pub mod auth;
pub mod backup;
pub mod calendar;
pub mod priority;
pub mod refresh;
pub mod routine;
pub mod status;
