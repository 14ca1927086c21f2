pub mod function_srv;
pub mod services;
pub mod session;
pub mod settings;
pub mod text_util;

#[cfg(test)]
pub mod mock;
