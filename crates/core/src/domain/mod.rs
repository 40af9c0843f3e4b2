pub mod guild;
pub mod ids;
