pub mod alerts;
pub mod authorities;
pub mod status;
