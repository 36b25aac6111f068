mod handlers;
mod routes;

pub use handlers::{AnswerResponse, OfferRequest};
pub use routes::create_router;
