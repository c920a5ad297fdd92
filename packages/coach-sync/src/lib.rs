pub mod handler;
pub mod listener;
pub mod retry;

mod error;
mod exercise;
mod workout;

pub use error::{Error, Result};
pub use handler::{EXERCISE_CHANNEL, SyncHandler, WORKOUT_CHANNEL};
pub use listener::{
	ChangeHandler, ChangeNotification, Listener, NotificationFeed, NotificationSource,
	PgNotificationSource,
};
pub use retry::RetryPolicy;

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
