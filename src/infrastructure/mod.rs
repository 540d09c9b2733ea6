pub mod backends;
pub mod credentials;
pub mod openers;
pub mod sandboxes;
