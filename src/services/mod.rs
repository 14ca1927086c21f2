pub mod playfab;
pub mod sessions;
