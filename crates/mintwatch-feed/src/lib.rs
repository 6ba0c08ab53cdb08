//! # mintwatch-feed
//!
//! Social feed integration: session recovery, mention scanning,
//! deduplication, and reply delivery.

pub mod browser;
pub mod chrome;
pub mod dedup;
pub mod locator;
pub mod reply;
pub mod scanner;
pub mod session;

pub use browser::BrowserFeed;
pub use chrome::ChromeDriver;
pub use dedup::{merge, Deduplicator};
pub use locator::{ElementLocator, ElementRole, Probe, Selector, UiDriver};
pub use reply::ReplyDispatcher;
pub use scanner::FeedScanner;
pub use session::{SessionManager, SessionPhase};
