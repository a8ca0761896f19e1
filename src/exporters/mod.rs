pub mod meta;
pub mod text;
