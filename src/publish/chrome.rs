//! Chrome driver for the browser channel, via `headless_chrome`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use tracing::debug;

use super::browser::{BrowserSession, ElementHandle, Query, SessionFactory};
use crate::config::BrowserConfig;
use crate::error::ChannelError;

const WINDOW_SIZE: (u32, u32) = (1280, 900);

fn browser_err(err: impl std::fmt::Display) -> ChannelError {
    ChannelError::Browser(err.to_string())
}

/// Launches a fresh Chrome per session.
pub struct ChromeFactory {
    headless: bool,
    idle_timeout: Duration,
}

impl ChromeFactory {
    pub fn new(config: &BrowserConfig) -> Self {
        // The browser must outlive the login wait and the dwell.
        let idle_timeout = config.login_timeout() + config.dwell() + Duration::from_secs(60);
        Self {
            headless: config.headless,
            idle_timeout,
        }
    }
}

impl SessionFactory for ChromeFactory {
    fn open(&self) -> Result<Box<dyn BrowserSession>, ChannelError> {
        debug!(headless = self.headless, "launching chrome");
        let browser = Browser::new(LaunchOptions {
            headless: self.headless,
            window_size: Some(WINDOW_SIZE),
            idle_browser_timeout: self.idle_timeout,
            ..Default::default()
        })
        .map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
        }))
    }
}

pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromeSession {
    fn element(&self, query: &Query) -> Result<Element<'_>, ChannelError> {
        let found = match query {
            Query::Css(selector) => self.tab.find_element(selector),
            Query::XPath(xpath) => self.tab.find_element_by_xpath(xpath),
        };
        found.map_err(browser_err)
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<(), ChannelError> {
        self.tab
            .navigate_to(url)
            .map_err(browser_err)?
            .wait_until_navigated()
            .map_err(browser_err)?;
        Ok(())
    }

    fn find(&self, query: &Query) -> Option<ElementHandle> {
        self.element(query).ok().map(|_| ElementHandle { query: query.clone() })
    }

    fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<(), ChannelError> {
        let el = self.element(&element.query)?;
        el.click().map_err(browser_err)?;
        el.type_into(text).map_err(browser_err)?;
        Ok(())
    }

    fn attach_files(&mut self, element: &ElementHandle, files: &[PathBuf]) -> Result<(), ChannelError> {
        let paths: Vec<String> = files
            .iter()
            .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()).display().to_string())
            .collect();
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        self.element(&element.query)?
            .set_input_files(&refs)
            .map_err(browser_err)?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(browser) = self.browser.take() {
            if let Err(e) = self.tab.close(true) {
                debug!(error = %e, "tab already gone");
            }
            drop(browser);
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}
