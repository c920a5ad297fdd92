//! Postgres LISTEN/NOTIFY supervision. A lost connection is re-established
//! with linear backoff up to a fixed ceiling; handler failures are logged and
//! never tear down the listen loop.

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use sqlx::postgres::PgListener;
use tokio::sync::watch;

use crate::{BoxFuture, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotification {
	pub channel: String,
	pub payload: String,
}

pub trait NotificationFeed
where
	Self: Send,
{
	fn recv(&mut self) -> BoxFuture<'_, Result<ChangeNotification>>;
	fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

pub trait NotificationSource
where
	Self: Send + Sync,
{
	fn connect(&self) -> BoxFuture<'_, Result<Box<dyn NotificationFeed>>>;
}

pub trait ChangeHandler
where
	Self: Send + Sync,
{
	fn handle<'a>(&'a self, notification: &'a ChangeNotification) -> BoxFuture<'a, Result<()>>;
}

pub struct PgNotificationSource {
	pub dsn: String,
	pub channels: Vec<String>,
}
impl NotificationSource for PgNotificationSource {
	fn connect(&self) -> BoxFuture<'_, Result<Box<dyn NotificationFeed>>> {
		Box::pin(async move {
			let mut listener = PgListener::connect(&self.dsn).await?;
			let channels: Vec<&str> = self.channels.iter().map(String::as_str).collect();

			listener.listen_all(channels).await?;

			Ok(Box::new(PgFeed { listener }) as Box<dyn NotificationFeed>)
		})
	}
}

struct PgFeed {
	listener: PgListener,
}
impl NotificationFeed for PgFeed {
	fn recv(&mut self) -> BoxFuture<'_, Result<ChangeNotification>> {
		Box::pin(async move {
			let notification = self.listener.recv().await?;

			Ok(ChangeNotification {
				channel: notification.channel().to_string(),
				payload: notification.payload().to_string(),
			})
		})
	}

	fn close(mut self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.listener.unlisten_all().await?;

			Ok(())
		})
	}
}

pub struct Listener {
	source: Arc<dyn NotificationSource>,
	handler: Arc<dyn ChangeHandler>,
	reconnect_max_attempts: u32,
	reconnect_base_delay: Duration,
	listening: AtomicBool,
}
impl Listener {
	pub fn new(
		source: Arc<dyn NotificationSource>,
		handler: Arc<dyn ChangeHandler>,
		cfg: &coach_config::SyncConfig,
	) -> Self {
		Self {
			source,
			handler,
			reconnect_max_attempts: cfg.reconnect_max_attempts,
			reconnect_base_delay: Duration::from_millis(cfg.reconnect_base_ms),
			listening: AtomicBool::new(false),
		}
	}

	pub fn is_listening(&self) -> bool {
		self.listening.load(Ordering::SeqCst)
	}

	/// Runs until shutdown is signalled or the reconnect budget is exhausted.
	/// Exhaustion is terminal but not an error; the rest of the process keeps
	/// serving while the index goes stale.
	pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
		'reconnect: loop {
			if *shutdown.borrow() {
				break;
			}

			let Some(mut feed) = self.connect_with_retry(&mut shutdown).await else {
				break;
			};

			self.listening.store(true, Ordering::SeqCst);
			tracing::info!("Change listener connected.");

			loop {
				let received = tokio::select! {
					changed = shutdown.changed() => {
						if changed.is_err() || *shutdown.borrow() {
							None
						} else {
							continue;
						}
					},
					received = feed.recv() => Some(received),
				};

				match received {
					None => {
						self.listening.store(false, Ordering::SeqCst);

						if let Err(err) = feed.close().await {
							tracing::warn!(error = %err, "Listener close failed.");
						}

						break 'reconnect;
					},
					Some(Ok(notification)) =>
						if let Err(err) = self.handler.handle(&notification).await {
							tracing::error!(
								error = %err,
								channel = %notification.channel,
								"Change handling failed."
							);
						},
					Some(Err(err)) => {
						tracing::warn!(error = %err, "Listener connection lost; reconnecting.");
						self.listening.store(false, Ordering::SeqCst);

						continue 'reconnect;
					},
				}
			}
		}

		self.listening.store(false, Ordering::SeqCst);

		Ok(())
	}

	async fn connect_with_retry(
		&self,
		shutdown: &mut watch::Receiver<bool>,
	) -> Option<Box<dyn NotificationFeed>> {
		for attempt in 1..=self.reconnect_max_attempts {
			if *shutdown.borrow() {
				return None;
			}

			match self.source.connect().await {
				Ok(feed) => return Some(feed),
				Err(err) => {
					tracing::warn!(error = %err, attempt, "Listener connect failed.");
				},
			}

			if attempt < self.reconnect_max_attempts {
				tokio::select! {
					_ = tokio::time::sleep(self.reconnect_base_delay * attempt) => {},
					changed = shutdown.changed() => {
						if changed.is_err() || *shutdown.borrow() {
							return None;
						}
					},
				}
			}
		}

		tracing::error!(
			attempts = self.reconnect_max_attempts,
			"Listener reconnect attempts exhausted; change sync is offline."
		);

		None
	}
}

#[cfg(test)]
mod tests {
	use std::{
		collections::VecDeque,
		sync::{
			Mutex,
			atomic::{AtomicUsize, Ordering},
		},
	};

	use tokio::sync::Notify;

	use super::*;
	use crate::Error;

	struct ScriptFeed {
		items: VecDeque<ChangeNotification>,
		closed: Arc<AtomicBool>,
	}
	impl NotificationFeed for ScriptFeed {
		fn recv(&mut self) -> BoxFuture<'_, Result<ChangeNotification>> {
			let next = self.items.pop_front();

			Box::pin(async move {
				match next {
					Some(notification) => Ok(notification),
					None => std::future::pending().await,
				}
			})
		}

		fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
			self.closed.store(true, Ordering::SeqCst);

			Box::pin(async { Ok(()) })
		}
	}

	struct ScriptSource {
		feeds: Mutex<VecDeque<Box<dyn NotificationFeed>>>,
	}
	impl NotificationSource for ScriptSource {
		fn connect(&self) -> BoxFuture<'_, Result<Box<dyn NotificationFeed>>> {
			let next = self.feeds.lock().expect("poisoned").pop_front();

			Box::pin(async move { next.ok_or(Error::Sqlx(sqlx::Error::PoolClosed)) })
		}
	}

	struct CountingHandler {
		count: Arc<AtomicUsize>,
		seen: Arc<Notify>,
		fail_first: bool,
	}
	impl ChangeHandler for CountingHandler {
		fn handle<'a>(
			&'a self,
			_notification: &'a ChangeNotification,
		) -> BoxFuture<'a, Result<()>> {
			let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;

			self.seen.notify_one();

			let fail = self.fail_first && count == 1;

			Box::pin(async move {
				if fail { Err(Error::Sqlx(sqlx::Error::PoolClosed)) } else { Ok(()) }
			})
		}
	}

	fn sync_cfg() -> coach_config::SyncConfig {
		coach_config::SyncConfig {
			max_attempts: 3,
			retry_base_ms: 10,
			reconnect_max_attempts: 3,
			reconnect_base_ms: 10,
		}
	}

	fn notification(n: u32) -> ChangeNotification {
		ChangeNotification {
			channel: "exercise_changes".to_string(),
			payload: format!("{{\"exercise_id\": \"ex_{n}\", \"operation\": \"INSERT\"}}"),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn reconnect_exhaustion_ends_the_run_without_error() {
		let source = Arc::new(ScriptSource { feeds: Mutex::new(VecDeque::new()) });
		let handler = Arc::new(CountingHandler {
			count: Arc::new(AtomicUsize::new(0)),
			seen: Arc::new(Notify::new()),
			fail_first: false,
		});
		let listener = Arc::new(Listener::new(source, handler, &sync_cfg()));
		let (_tx, rx) = watch::channel(false);

		listener.run(rx).await.expect("exhaustion should not be an error");
		assert!(!listener.is_listening());
	}

	#[tokio::test(start_paused = true)]
	async fn handler_errors_do_not_stop_the_loop() {
		let count = Arc::new(AtomicUsize::new(0));
		let seen = Arc::new(Notify::new());
		let closed = Arc::new(AtomicBool::new(false));
		let feed: Box<dyn NotificationFeed> = Box::new(ScriptFeed {
			items: VecDeque::from([notification(1), notification(2)]),
			closed: closed.clone(),
		});
		let source = Arc::new(ScriptSource { feeds: Mutex::new(VecDeque::from([feed])) });
		let handler = Arc::new(CountingHandler {
			count: count.clone(),
			seen: seen.clone(),
			fail_first: true,
		});
		let listener = Arc::new(Listener::new(source, handler, &sync_cfg()));
		let (tx, rx) = watch::channel(false);
		let run = tokio::spawn({
			let listener = listener.clone();

			async move { listener.run(rx).await }
		});

		while count.load(Ordering::SeqCst) < 2 {
			seen.notified().await;
		}

		tx.send(true).expect("listener should still be running");
		run.await.expect("join failed").expect("run failed");

		assert_eq!(count.load(Ordering::SeqCst), 2);
		assert!(closed.load(Ordering::SeqCst));
		assert!(!listener.is_listening());
	}

	#[tokio::test(start_paused = true)]
	async fn lost_connection_reconnects_to_the_next_feed() {
		let count = Arc::new(AtomicUsize::new(0));
		let seen = Arc::new(Notify::new());
		let closed = Arc::new(AtomicBool::new(false));
		// First connect fails outright (empty queue entry is simulated by a
		// feed whose recv errors), so craft one erroring feed then a good one.
		struct FailingFeed;
		impl NotificationFeed for FailingFeed {
			fn recv(&mut self) -> BoxFuture<'_, Result<ChangeNotification>> {
				Box::pin(async { Err(Error::Sqlx(sqlx::Error::PoolClosed)) })
			}

			fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
				Box::pin(async { Ok(()) })
			}
		}

		let failing: Box<dyn NotificationFeed> = Box::new(FailingFeed);
		let good: Box<dyn NotificationFeed> = Box::new(ScriptFeed {
			items: VecDeque::from([notification(1)]),
			closed: closed.clone(),
		});
		let source =
			Arc::new(ScriptSource { feeds: Mutex::new(VecDeque::from([failing, good])) });
		let handler = Arc::new(CountingHandler {
			count: count.clone(),
			seen: seen.clone(),
			fail_first: false,
		});
		let listener = Arc::new(Listener::new(source, handler, &sync_cfg()));
		let (tx, rx) = watch::channel(false);
		let run = tokio::spawn({
			let listener = listener.clone();

			async move { listener.run(rx).await }
		});

		seen.notified().await;
		tx.send(true).expect("listener should still be running");
		run.await.expect("join failed").expect("run failed");

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
