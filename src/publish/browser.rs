//! BrowserAutomation channel.
//!
//! The channel only knows the [`BrowserSession`] capability: navigate, probe
//! a query, type, attach files, close. The Chrome driver lives in
//! [`super::chrome`]; tests drive a scripted session.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::PublishRequest;
use crate::config::BrowserConfig;
use crate::error::ChannelError;

/// Prefix that marks a configured locator as XPath.
const XPATH_PREFIX: &str = "xpath:";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Css(String),
    XPath(String),
}

impl Query {
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(XPATH_PREFIX) {
            Some(xpath) => Query::XPath(xpath.trim().to_string()),
            None => Query::Css(raw.trim().to_string()),
        }
    }
}

/// Proof that a query matched at probe time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub query: Query,
}

/// One live browser page.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), ChannelError>;

    /// Returns a handle when `query` currently matches an element.
    fn find(&self, query: &Query) -> Option<ElementHandle>;

    fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<(), ChannelError>;

    fn attach_files(&mut self, element: &ElementHandle, files: &[PathBuf]) -> Result<(), ChannelError>;

    /// Releases every resource held by the session. Must be idempotent.
    fn close(&mut self);
}

pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn BrowserSession>, ChannelError>;
}

/// A single probe in a first-match-wins list.
pub trait Locator: Send + Sync {
    fn try_locate(&self, session: &dyn BrowserSession) -> Option<ElementHandle>;
    fn describe(&self) -> String;
}

pub struct CssLocator(pub String);

impl Locator for CssLocator {
    fn try_locate(&self, session: &dyn BrowserSession) -> Option<ElementHandle> {
        session.find(&Query::Css(self.0.clone()))
    }

    fn describe(&self) -> String {
        format!("css `{}`", self.0)
    }
}

pub struct XPathLocator(pub String);

impl Locator for XPathLocator {
    fn try_locate(&self, session: &dyn BrowserSession) -> Option<ElementHandle> {
        session.find(&Query::XPath(self.0.clone()))
    }

    fn describe(&self) -> String {
        format!("xpath `{}`", self.0)
    }
}

/// Builds probes from configured strings, keeping their order.
pub fn locators(raw: &[String]) -> Vec<Box<dyn Locator>> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| -> Box<dyn Locator> {
            match Query::parse(s) {
                Query::Css(css) => Box::new(CssLocator(css)),
                Query::XPath(xpath) => Box::new(XPathLocator(xpath)),
            }
        })
        .collect()
}

fn first_match(candidates: &[Box<dyn Locator>], session: &dyn BrowserSession) -> Option<(usize, ElementHandle)> {
    candidates
        .iter()
        .enumerate()
        .find_map(|(i, locator)| locator.try_locate(session).map(|handle| (i, handle)))
}

/// Closes the wrapped session on every exit path.
struct SessionGuard(Box<dyn BrowserSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!("releasing browser session");
        self.0.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserTiming {
    pub login_timeout: Duration,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub dwell: Duration,
}

impl From<&BrowserConfig> for BrowserTiming {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            login_timeout: config.login_timeout(),
            poll_interval: config.poll_interval(),
            progress_interval: config.progress_interval(),
            dwell: config.dwell(),
        }
    }
}

/// Which fields were populated. Misses are soft failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserReport {
    pub login_waited: bool,
    pub images_attached: bool,
    pub title_filled: bool,
    pub content_filled: bool,
}

impl BrowserReport {
    pub fn missed_fields(&self) -> Vec<&'static str> {
        let mut missed = Vec::new();
        if !self.images_attached {
            missed.push("images");
        }
        if !self.title_filled {
            missed.push("title");
        }
        if !self.content_filled {
            missed.push("content");
        }
        missed
    }
}

#[derive(Clone, Copy)]
enum Action<'r> {
    Attach(&'r [PathBuf]),
    Type(&'r str),
}

pub struct BrowserPublisher {
    factory: Box<dyn SessionFactory>,
    publish_url: String,
    login_indicators: Vec<Box<dyn Locator>>,
    upload: Vec<Box<dyn Locator>>,
    title: Vec<Box<dyn Locator>>,
    content: Vec<Box<dyn Locator>>,
    timing: BrowserTiming,
}

impl BrowserPublisher {
    pub fn new(config: &BrowserConfig, factory: Box<dyn SessionFactory>) -> Self {
        Self {
            factory,
            publish_url: config.publish_url.clone(),
            login_indicators: locators(&config.login_indicators),
            upload: locators(&config.upload_locators),
            title: locators(&config.title_locators),
            content: locators(&config.content_locators),
            timing: BrowserTiming::from(config),
        }
    }

    #[cfg(test)]
    pub fn with_timing(mut self, timing: BrowserTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Drives one session end to end. Blocks the calling thread.
    ///
    /// Navigation, session and login failures abort the channel. Field
    /// misses are logged and reported, never raised.
    pub fn publish(&self, request: &PublishRequest) -> Result<BrowserReport, ChannelError> {
        let mut guard = SessionGuard(self.factory.open()?);
        let session = guard.0.as_mut();

        info!(url = %self.publish_url, "opening publish page");
        session.navigate(&self.publish_url)?;

        let mut report = BrowserReport::default();
        if let Some(indicator) = self.login_indicator(session) {
            info!(%indicator, "login required, waiting for the operator");
            report.login_waited = true;
            self.wait_for_login(session)?;
            info!("login detected");
        }

        report.images_attached = if request.images.is_empty() {
            true
        } else {
            populate(session, "images", &self.upload, Action::Attach(&request.images))
        };
        report.title_filled = populate(session, "title", &self.title, Action::Type(&request.title));
        let content = compose_content(request);
        report.content_filled = populate(session, "content", &self.content, Action::Type(&content));

        info!(
            dwell_secs = self.timing.dwell.as_secs(),
            "note staged, waiting for confirmation in the browser"
        );
        thread::sleep(self.timing.dwell);
        Ok(report)
    }

    fn login_indicator(&self, session: &dyn BrowserSession) -> Option<String> {
        first_match(&self.login_indicators, session).map(|(i, _)| self.login_indicators[i].describe())
    }

    fn wait_for_login(&self, session: &dyn BrowserSession) -> Result<(), ChannelError> {
        let started = Instant::now();
        let mut last_progress = started;
        loop {
            thread::sleep(self.timing.poll_interval);
            if self.login_indicator(session).is_none() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.timing.login_timeout {
                return Err(ChannelError::LoginTimeout {
                    waited_secs: self.timing.login_timeout.as_secs(),
                });
            }
            if last_progress.elapsed() >= self.timing.progress_interval {
                let remaining = self.timing.login_timeout.saturating_sub(waited);
                info!(
                    waited_secs = waited.as_secs(),
                    remaining_secs = remaining.as_secs(),
                    "still waiting for login"
                );
                last_progress = Instant::now();
            }
        }
    }
}

/// Tries each candidate in order; the first one that matches and accepts
/// the action wins. Returns `false` after warning when none does.
fn populate(
    session: &mut dyn BrowserSession,
    field: &str,
    candidates: &[Box<dyn Locator>],
    action: Action<'_>,
) -> bool {
    for locator in candidates {
        let Some(handle) = locator.try_locate(session) else {
            continue;
        };
        let result = match action {
            Action::Attach(files) => session.attach_files(&handle, files),
            Action::Type(text) => session.type_text(&handle, text),
        };
        match result {
            Ok(()) => {
                debug!(field, locator = %locator.describe(), "field populated");
                return true;
            }
            Err(e) => warn!(field, locator = %locator.describe(), error = %e, "locator matched but action failed"),
        }
    }
    warn!(field, tried = candidates.len(), "no locator matched, leaving field unfilled");
    false
}

fn compose_content(request: &PublishRequest) -> String {
    if request.tags.is_empty() {
        request.body.clone()
    } else {
        format!("{}\n\n{}", request.body, request.tags.join(" "))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// What the scripted page currently shows and what was done to it.
    #[derive(Default)]
    pub(crate) struct PageState {
        pub present: Vec<Query>,
        /// Login indicators vanish after this many probes.
        pub login_probes_left: usize,
        pub login_indicator: Option<Query>,
        pub fail_navigation: bool,
        pub navigated: Vec<String>,
        pub typed: HashMap<String, String>,
        pub attached: Vec<PathBuf>,
        pub opened: usize,
        pub closed: usize,
    }

    pub(crate) struct ScriptedSession(Arc<Mutex<PageState>>);

    fn key(query: &Query) -> String {
        match query {
            Query::Css(s) => s.clone(),
            Query::XPath(s) => format!("xpath:{s}"),
        }
    }

    impl BrowserSession for ScriptedSession {
        fn navigate(&mut self, url: &str) -> Result<(), ChannelError> {
            let mut state = self.0.lock().unwrap();
            if state.fail_navigation {
                return Err(ChannelError::Browser("net::ERR_NAME_NOT_RESOLVED".into()));
            }
            state.navigated.push(url.to_string());
            Ok(())
        }

        fn find(&self, query: &Query) -> Option<ElementHandle> {
            let mut state = self.0.lock().unwrap();
            if state.login_indicator.as_ref() == Some(query) {
                if state.login_probes_left == 0 {
                    return None;
                }
                state.login_probes_left -= 1;
                return Some(ElementHandle { query: query.clone() });
            }
            state
                .present
                .contains(query)
                .then(|| ElementHandle { query: query.clone() })
        }

        fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<(), ChannelError> {
            self.0
                .lock()
                .unwrap()
                .typed
                .insert(key(&element.query), text.to_string());
            Ok(())
        }

        fn attach_files(&mut self, _element: &ElementHandle, files: &[PathBuf]) -> Result<(), ChannelError> {
            self.0.lock().unwrap().attached.extend_from_slice(files);
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closed += 1;
        }
    }

    pub(crate) struct ScriptedFactory(pub Arc<Mutex<PageState>>);

    impl SessionFactory for ScriptedFactory {
        fn open(&self) -> Result<Box<dyn BrowserSession>, ChannelError> {
            self.0.lock().unwrap().opened += 1;
            Ok(Box::new(ScriptedSession(self.0.clone())))
        }
    }

    pub(crate) fn fast_timing() -> BrowserTiming {
        BrowserTiming {
            login_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            progress_interval: Duration::from_millis(20),
            dwell: Duration::from_millis(1),
        }
    }

    pub(crate) fn config() -> BrowserConfig {
        BrowserConfig {
            publish_url: "https://creator.example.com/publish".into(),
            login_indicators: vec![".qrcode-img".into(), "xpath://button[text()='Log in']".into()],
            upload_locators: vec!["input[type=\"file\"]".into()],
            title_locators: vec!["#missing-title".into(), ".title-input input".into()],
            content_locators: vec!["xpath://div[@contenteditable='true']".into()],
            ..Default::default()
        }
    }

    /// A page where every configured field except the first title candidate exists.
    pub(crate) fn ready_page() -> PageState {
        PageState {
            present: vec![
                Query::Css("input[type=\"file\"]".into()),
                Query::Css(".title-input input".into()),
                Query::XPath("//div[@contenteditable='true']".into()),
            ],
            ..Default::default()
        }
    }

    fn request() -> PublishRequest {
        PublishRequest {
            title: "Title".into(),
            body: "Body".into(),
            tags: vec!["#a".into(), "#b".into()],
            images: vec![PathBuf::from("output/cover_0_1.png")],
        }
    }

    fn publisher(state: &Arc<Mutex<PageState>>) -> BrowserPublisher {
        BrowserPublisher::new(&config(), Box::new(ScriptedFactory(state.clone()))).with_timing(fast_timing())
    }

    #[test]
    fn query_parse_recognises_xpath_prefix() {
        assert_eq!(Query::parse("xpath://a"), Query::XPath("//a".into()));
        assert_eq!(Query::parse(" .btn "), Query::Css(".btn".into()));
    }

    #[test]
    fn fields_use_first_matching_locator() {
        let state = Arc::new(Mutex::new(ready_page()));
        let report = publisher(&state).publish(&request()).unwrap();

        assert_eq!(
            report,
            BrowserReport {
                login_waited: false,
                images_attached: true,
                title_filled: true,
                content_filled: true,
            }
        );
        let state = state.lock().unwrap();
        assert_eq!(state.navigated, vec!["https://creator.example.com/publish"]);
        assert_eq!(state.typed.get(".title-input input").map(String::as_str), Some("Title"));
        assert_eq!(
            state.typed.get("xpath://div[@contenteditable='true']").map(String::as_str),
            Some("Body\n\n#a #b")
        );
        assert_eq!(state.attached, vec![PathBuf::from("output/cover_0_1.png")]);
        assert_eq!(state.closed, 1);
    }

    #[test]
    fn missing_field_is_soft_failure() {
        let mut page = ready_page();
        page.present.retain(|q| !matches!(q, Query::XPath(_)));
        let state = Arc::new(Mutex::new(page));

        let report = publisher(&state).publish(&request()).unwrap();
        assert!(report.title_filled);
        assert!(!report.content_filled);
        assert_eq!(report.missed_fields(), vec!["content"]);
        assert_eq!(state.lock().unwrap().closed, 1);
    }

    #[test]
    fn login_is_awaited_until_indicator_disappears() {
        let mut page = ready_page();
        page.login_indicator = Some(Query::Css(".qrcode-img".into()));
        page.login_probes_left = 4;
        let state = Arc::new(Mutex::new(page));

        let report = publisher(&state).publish(&request()).unwrap();
        assert!(report.login_waited);
        assert!(report.title_filled);
        assert_eq!(state.lock().unwrap().login_probes_left, 0);
    }

    #[test]
    fn login_timeout_aborts_and_releases_session() {
        let mut page = ready_page();
        page.login_indicator = Some(Query::XPath("//button[text()='Log in']".into()));
        page.login_probes_left = usize::MAX;
        let state = Arc::new(Mutex::new(page));

        let started = Instant::now();
        let err = publisher(&state).publish(&request()).unwrap_err();
        assert!(matches!(err, ChannelError::LoginTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(200));

        let state = state.lock().unwrap();
        assert!(state.typed.is_empty());
        assert_eq!(state.closed, 1);
    }

    #[test]
    fn navigation_failure_releases_session() {
        let mut page = ready_page();
        page.fail_navigation = true;
        let state = Arc::new(Mutex::new(page));

        let err = publisher(&state).publish(&request()).unwrap_err();
        assert!(matches!(err, ChannelError::Browser(_)));
        assert_eq!(state.lock().unwrap().closed, 1);
    }

    #[test]
    fn no_images_means_nothing_to_attach() {
        let state = Arc::new(Mutex::new(PageState::default()));
        let mut req = request();
        req.images.clear();

        let report = publisher(&state).publish(&req).unwrap();
        assert!(report.images_attached);
        assert_eq!(report.missed_fields(), vec!["title", "content"]);
    }
}
