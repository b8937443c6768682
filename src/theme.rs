//! Dark-mode detection.
//!
//! The fragment may be hosted by a plain browser, GoldenDict, or the two
//! Eudic readers, and each host exposes its color scheme differently.
//! Detection is a probe over the host plus, for hosts that flip the scheme
//! at runtime, a subscription that re-runs detection when the observed
//! body classes change.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::dom::{Fragment, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// Host environments with distinct detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Plain browser. The media query is authoritative.
    Browser,
    /// GoldenDict wraps the page and mirrors its scheme into a
    /// `data-darkreader-scheme` document attribute.
    GoldenDict,
    /// Desktop Eudic toggles `black` on the body at runtime.
    Eudic,
    /// Mobile Eudic toggles `night` on the body at runtime.
    EudicMobile,
}

impl HostKind {
    pub fn from_user_agent(ua: &str) -> Self {
        let ua = ua.to_ascii_lowercase();
        if ua.contains("goldendict") {
            HostKind::GoldenDict
        } else if ua.contains("eudic ios") || ua.contains("eudic android") {
            HostKind::EudicMobile
        } else if ua.contains("eudic") {
            HostKind::Eudic
        } else {
            HostKind::Browser
        }
    }
}

/// What detection can see of the host document.
pub trait HostProbe: Send + Sync {
    /// `prefers-color-scheme: dark` media query result.
    fn prefers_dark(&self) -> bool;
    /// A document-level attribute, e.g. `data-darkreader-scheme`.
    fn document_attr(&self, name: &str) -> Option<String>;
    /// Classes currently set on the host body.
    fn body_classes(&self) -> Vec<String>;
}

/// Fixed-value probe for tests and for the server-side pass, where only
/// the user agent is known.
#[derive(Debug, Default)]
pub struct StaticProbe {
    pub prefers_dark: bool,
    pub darkreader_scheme: Option<String>,
    pub body_classes: Vec<String>,
}

impl HostProbe for StaticProbe {
    fn prefers_dark(&self) -> bool {
        self.prefers_dark
    }

    fn document_attr(&self, name: &str) -> Option<String> {
        if name == "data-darkreader-scheme" {
            self.darkreader_scheme.clone()
        } else {
            None
        }
    }

    fn body_classes(&self) -> Vec<String> {
        self.body_classes.clone()
    }
}

/// Runs the host's detection strategy once.
pub fn detect(host: HostKind, probe: &dyn HostProbe) -> Theme {
    let theme = match host {
        HostKind::Browser => {
            if probe.prefers_dark() {
                Theme::Dark
            } else {
                Theme::Light
            }
        }
        HostKind::GoldenDict => {
            match probe.document_attr("data-darkreader-scheme").as_deref() {
                Some("dark") => Theme::Dark,
                Some(_) => Theme::Light,
                None if probe.prefers_dark() => Theme::Dark,
                None => Theme::Light,
            }
        }
        HostKind::Eudic => {
            if probe.body_classes().iter().any(|c| c == "black") {
                Theme::Dark
            } else {
                Theme::Light
            }
        }
        HostKind::EudicMobile => {
            if probe.body_classes().iter().any(|c| c == "night") {
                Theme::Dark
            } else {
                Theme::Light
            }
        }
    };
    debug!(?host, theme = theme.as_str(), "detected color scheme");
    theme
}

pub fn apply_theme(frag: &mut Fragment, root: NodeId, theme: Theme) {
    frag.set_attr(root, "data-theme", theme.as_str());
}

type Callback = Box<dyn FnMut(Theme) + Send>;

struct Observer {
    id: u64,
    callback: Callback,
}

/// Re-runs detection when the host reports a body-class mutation, for the
/// Eudic hosts that flip their scheme while the entry is on screen.
/// Subscriptions hold an explicit handle; dropping or cancelling the
/// handle tears the observer down.
pub struct ObserverRegistry {
    host: HostKind,
    inner: Arc<Mutex<RegistryInner>>,
}

struct RegistryInner {
    next_id: u64,
    observers: Vec<Observer>,
}

impl ObserverRegistry {
    pub fn new(host: HostKind) -> Self {
        Self {
            host,
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(Theme) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push(Observer {
            id,
            callback: Box::new(callback),
        });
        Subscription {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Called by the host glue on a body-class mutation.
    pub fn notify(&self, probe: &dyn HostProbe) {
        let theme = detect(self.host, probe);
        let mut inner = self.inner.lock();
        for observer in &mut inner.observers {
            (observer.callback)(theme);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

pub struct Subscription {
    id: u64,
    inner: Arc<Mutex<RegistryInner>>,
}

impl Subscription {
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.lock().observers.retain(|o| o.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn host_kind_from_user_agent() {
        assert_eq!(HostKind::from_user_agent("Mozilla/5.0"), HostKind::Browser);
        assert_eq!(
            HostKind::from_user_agent("GoldenDict/1.5"),
            HostKind::GoldenDict
        );
        assert_eq!(HostKind::from_user_agent("Eudic/13"), HostKind::Eudic);
        assert_eq!(
            HostKind::from_user_agent("Eudic iOS/12"),
            HostKind::EudicMobile
        );
    }

    #[test]
    fn browser_follows_media_query() {
        let probe = StaticProbe {
            prefers_dark: true,
            ..StaticProbe::default()
        };
        assert_eq!(detect(HostKind::Browser, &probe), Theme::Dark);
        assert_eq!(
            detect(HostKind::Browser, &StaticProbe::default()),
            Theme::Light
        );
    }

    #[test]
    fn goldendict_attr_overrides_media_query() {
        let probe = StaticProbe {
            prefers_dark: true,
            darkreader_scheme: Some("normal".to_string()),
            ..StaticProbe::default()
        };
        assert_eq!(detect(HostKind::GoldenDict, &probe), Theme::Light);
        let probe = StaticProbe {
            darkreader_scheme: Some("dark".to_string()),
            ..StaticProbe::default()
        };
        assert_eq!(detect(HostKind::GoldenDict, &probe), Theme::Dark);
    }

    #[test]
    fn eudic_hosts_watch_body_classes() {
        let probe = StaticProbe {
            body_classes: vec!["black".to_string()],
            ..StaticProbe::default()
        };
        assert_eq!(detect(HostKind::Eudic, &probe), Theme::Dark);
        assert_eq!(detect(HostKind::EudicMobile, &probe), Theme::Light);

        let probe = StaticProbe {
            body_classes: vec!["night".to_string()],
            ..StaticProbe::default()
        };
        assert_eq!(detect(HostKind::EudicMobile, &probe), Theme::Dark);
    }

    #[test]
    fn subscription_teardown_removes_observer() {
        let registry = ObserverRegistry::new(HostKind::Eudic);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let sub = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.observer_count(), 1);

        let probe = StaticProbe {
            body_classes: vec!["black".to_string()],
            ..StaticProbe::default()
        };
        registry.notify(&probe);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sub.cancel();
        assert_eq!(registry.observer_count(), 0);
        registry.notify(&probe);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
