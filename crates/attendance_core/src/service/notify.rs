//! User-visible notification channel.
//!
//! # Responsibility
//! - Carry success and failure notices from services to whatever surface the
//!   host application shows them on.
//!
//! # Invariants
//! - Write and aggregation failures are always reported through a `Notifier`;
//!   they are never swallowed.

use log::{error, info};
use std::cell::RefCell;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// One user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            description: Some(description.into()),
        }
    }

    pub fn error(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description,
        }
    }
}

/// Reporting channel toward the user.
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Forwards notices to the log. Used when no UI surface is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        let description = notice.description.as_deref().unwrap_or("");
        match notice.level {
            NoticeLevel::Info => info!(
                "event=notice module=notify status=ok title={:?} description={:?}",
                notice.title, description
            ),
            NoticeLevel::Error => error!(
                "event=notice module=notify status=error title={:?} description={:?}",
                notice.title, description
            ),
        }
    }
}

/// Keeps every notice in memory, in delivery order.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: RefCell<Vec<Notice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn errors(&self) -> Vec<Notice> {
        self.notices
            .borrow()
            .iter()
            .filter(|notice| notice.level == NoticeLevel::Error)
            .cloned()
            .collect()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}
