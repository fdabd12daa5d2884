pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod ws;

pub use routes::create_router;
