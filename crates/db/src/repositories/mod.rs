//! One zero-sized repository per table. Every method takes the pool
//! explicitly and returns raw `sqlx::Error`s for the API layer to classify.

pub mod command_repo;
pub mod log_repo;
pub mod photo_repo;
pub mod settings_repo;
pub mod user_repo;
pub mod video_repo;

pub use command_repo::CommandRepo;
pub use log_repo::LogRepo;
pub use photo_repo::PhotoRepo;
pub use settings_repo::SettingsRepo;
pub use user_repo::UserRepo;
pub use video_repo::VideoRepo;
