pub mod router;
pub mod health;
