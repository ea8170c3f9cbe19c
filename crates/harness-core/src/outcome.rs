use axum::http::StatusCode;
use rand::Rng;

/// Simulated response classification produced by the request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    Accepted,
    BadRequest,
    InternalError,
}

impl Outcome {
    pub fn status(self) -> StatusCode {
        match self {
            Outcome::Ok => StatusCode::OK,
            Outcome::Accepted => StatusCode::ACCEPTED,
            Outcome::BadRequest => StatusCode::BAD_REQUEST,
            Outcome::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Outcome::Ok | Outcome::Accepted)
    }
}

/// Draw an outcome: 70% positive, 30% negative, uniform within each branch.
pub fn generate<R: Rng>(rng: &mut R) -> Outcome {
    let positive = rng.random_range(0..10) < 7;
    let first = rng.random_bool(0.5);
    match (positive, first) {
        (true, true) => Outcome::Ok,
        (true, false) => Outcome::Accepted,
        (false, true) => Outcome::BadRequest,
        (false, false) => Outcome::InternalError,
    }
}
