//! Minimal blocking client for the W3C WebDriver protocol.
//!
//! Drives an already-running chromedriver (or any W3C endpoint) over HTTP,
//! exposing just the handful of commands the collector needs. The session is
//! deleted when the [WebDriver] value is dropped, so the browser is released
//! on every exit path.

use crate::dom::{DomSession, ElementId};
use crate::error::Error;
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};

/// Key under which the protocol nests element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// How often `wait_for` re-probes the page.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct WebDriver {
    client: reqwest::blocking::Client,
    base: String,
    session: Option<String>,
}

impl WebDriver {
    /// Opens a browser session against a WebDriver endpoint such as
    /// `http://localhost:9515`.
    pub fn new_session(endpoint: &str, headless: bool) -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            // page loads block the navigation command on the far side
            .timeout(Duration::from_secs(120))
            .build()?;
        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
        ];
        if headless {
            args.insert(0, "--headless");
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let base = endpoint.trim_end_matches('/').to_owned();
        let value = execute(client.post(format!("{}/session", base)).json(&capabilities))?;
        let session = value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::WebDriver {
                context: "session response carried no sessionId".to_owned(),
            })?;
        log::debug!("webdriver session {} opened on {}", session, base);
        Ok(WebDriver {
            client,
            base,
            session: Some(session),
        })
    }

    /// Deletes the session, closing the browser window.
    pub fn quit(mut self) -> Result<(), Error> {
        self.end_session()
    }

    fn end_session(&mut self) -> Result<(), Error> {
        if let Some(session) = self.session.take() {
            execute(
                self.client
                    .delete(format!("{}/session/{}", self.base, session)),
            )?;
            log::debug!("webdriver session {} closed", session);
        }
        Ok(())
    }

    fn session_url(&self, rest: &str) -> Result<String, Error> {
        let session = self.session.as_deref().ok_or_else(|| Error::WebDriver {
            context: "session already closed".to_owned(),
        })?;
        Ok(format!("{}/session/{}{}", self.base, session, rest))
    }

    fn locate(&self, url: String, selector: &str) -> Result<ElementId, Error> {
        let body = json!({ "using": "css selector", "value": selector });
        match execute(self.client.post(url).json(&body)) {
            Ok(value) => element_from(&value).ok_or_else(|| Error::WebDriver {
                context: format!("element response for `{}` carried no element id", selector),
            }),
            Err(e) if is_no_such_element(&e) => Err(Error::ElementNotFound {
                selector: selector.to_owned(),
            }),
            Err(e) => Err(e),
        }
    }
}

impl DomSession for WebDriver {
    fn navigate(&mut self, url: &str) -> Result<(), Error> {
        log::info!("navigating to {}", url);
        execute(
            self.client
                .post(self.session_url("/url")?)
                .json(&json!({ "url": url })),
        )?;
        Ok(())
    }

    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<ElementId, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(selector) {
                Ok(element) => return Ok(element),
                Err(Error::ElementNotFound { .. }) if Instant::now() < deadline => {
                    thread::sleep(POLL_INTERVAL)
                }
                Err(Error::ElementNotFound { .. }) => {
                    return Err(Error::RenderTimeout {
                        selector: selector.to_owned(),
                        waited: timeout,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn find(&mut self, selector: &str) -> Result<ElementId, Error> {
        self.locate(self.session_url("/element")?, selector)
    }

    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementId>, Error> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = execute(
            self.client
                .post(self.session_url("/elements")?)
                .json(&body),
        )?;
        let list = value.as_array().cloned().unwrap_or_default();
        Ok(list.iter().filter_map(element_from).collect())
    }

    fn find_in(&mut self, parent: &ElementId, selector: &str) -> Result<ElementId, Error> {
        self.locate(
            self.session_url(&format!("/element/{}/element", parent))?,
            selector,
        )
    }

    fn text(&mut self, element: &ElementId) -> Result<String, Error> {
        let value = execute(
            self.client
                .get(self.session_url(&format!("/element/{}/text", element))?),
        )?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::WebDriver {
                context: format!("text response for element {} was not a string", element),
            })
    }

    fn class_list(&mut self, element: &ElementId) -> Result<Vec<String>, Error> {
        let value = execute(
            self.client
                .get(self.session_url(&format!("/element/{}/attribute/class", element))?),
        )?;
        Ok(value
            .as_str()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_owned)
            .collect())
    }
}

impl Drop for WebDriver {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.end_session() {
                log::warn!("could not close webdriver session: {}", e);
            }
        }
    }
}

/// Sends a request and unwraps the protocol's `{"value": ...}` envelope.
fn execute(request: reqwest::blocking::RequestBuilder) -> Result<Value, Error> {
    let response = request.send()?;
    let status = response.status();
    let body: Value = response.json()?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(Error::WebDriver {
        context: format!("{} ({}): {}", code, status, message),
    })
}

fn element_from(value: &Value) -> Option<ElementId> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_owned()))
}

fn is_no_such_element(error: &Error) -> bool {
    match error {
        Error::WebDriver { context } => context.starts_with("no such element"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_element_references() {
        let value = json!({ ELEMENT_KEY: "f32c8a1e-ab37-4c" });
        assert_eq!(Some(ElementId("f32c8a1e-ab37-4c".to_owned())), element_from(&value));
        assert_eq!(None, element_from(&json!({ "other": 1 })));
        assert_eq!(None, element_from(&Value::Null));
    }

    #[test]
    fn recognizes_missing_element_errors() {
        let miss = Error::WebDriver {
            context: "no such element (404): unable to locate".to_owned(),
        };
        assert!(is_no_such_element(&miss));
        let other = Error::WebDriver {
            context: "invalid session id (404): gone".to_owned(),
        };
        assert!(!is_no_such_element(&other));
    }
}
