pub mod comparison;
pub mod health;
pub mod jobs;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}
