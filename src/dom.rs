//! Query interface over a rendered page.
//!
//! The extraction and pipeline layers only ever talk to a [DomSession], so
//! the same logic runs against a live browser (see the `webdriver` module)
//! or against a saved HTML snapshot.

use crate::error::Error;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Opaque handle to an element held by a [DomSession].
///
/// Handles are only meaningful for the session that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(pub(crate) String);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A page being inspected, live or snapshotted.
///
/// All lookups use CSS selectors. Single-element lookups fail with
/// [Error::ElementNotFound] when nothing matches; [DomSession::find_all]
/// returns an empty list instead. Session teardown is the implementation's
/// business, via `Drop`.
pub trait DomSession {
    /// Loads the given url. Backends over static documents ignore this.
    fn navigate(&mut self, url: &str) -> Result<(), Error>;
    /// Waits until an element matching `selector` is present, failing with
    /// [Error::RenderTimeout] once `timeout` has elapsed without a match.
    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<ElementId, Error>;
    /// First element matching `selector`, in document order.
    fn find(&mut self, selector: &str) -> Result<ElementId, Error>;
    /// Every element matching `selector`, in document order.
    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementId>, Error>;
    /// First descendant of `parent` matching `selector`.
    fn find_in(&mut self, parent: &ElementId, selector: &str) -> Result<ElementId, Error>;
    /// Text content of the element, whitespace preserved.
    fn text(&mut self, element: &ElementId) -> Result<String, Error>;
    /// The element's CSS classes in attribute order, empty when it has none.
    fn class_list(&mut self, element: &ElementId) -> Result<Vec<String>, Error>;
}

/// A [DomSession] over a static HTML document.
///
/// Used by the test suite and by `collect --from-snapshot` to replay pages
/// saved with the `snapshot` subcommand.
pub struct SnapshotDom {
    html: Html,
    handles: Vec<NodeId>,
}

impl SnapshotDom {
    pub fn from_html(html: &str) -> Self {
        SnapshotDom {
            html: Html::parse_document(html),
            handles: Vec::new(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self::from_html(&std::fs::read_to_string(path)?))
    }

    fn compile(selector: &str) -> Result<Selector, Error> {
        Selector::parse(selector).map_err(|e| Error::Selector {
            selector: selector.to_owned(),
            reason: e.to_string(),
        })
    }

    fn register(&mut self, node: NodeId) -> ElementId {
        self.handles.push(node);
        ElementId(format!("{}", self.handles.len() - 1))
    }

    fn resolve(&self, element: &ElementId) -> Result<ElementRef<'_>, Error> {
        let node = element
            .0
            .parse::<usize>()
            .ok()
            .and_then(|index| self.handles.get(index))
            .and_then(|id| self.html.tree.get(*id))
            .and_then(ElementRef::wrap);
        node.ok_or_else(|| Error::ElementRead {
            element: element.to_string(),
            reason: "handle does not belong to this snapshot".to_owned(),
        })
    }
}

impl DomSession for SnapshotDom {
    fn navigate(&mut self, url: &str) -> Result<(), Error> {
        log::debug!("snapshot backend ignores navigation to {}", url);
        Ok(())
    }

    fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<ElementId, Error> {
        // a static document will never become readier than it already is
        self.find(selector).map_err(|e| match e {
            Error::ElementNotFound { selector } => Error::RenderTimeout {
                selector,
                waited: Duration::ZERO,
            },
            other => other,
        })
    }

    fn find(&mut self, selector: &str) -> Result<ElementId, Error> {
        let compiled = Self::compile(selector)?;
        let node = self.html.select(&compiled).next().map(|element| element.id());
        match node {
            Some(node) => Ok(self.register(node)),
            None => Err(Error::ElementNotFound {
                selector: selector.to_owned(),
            }),
        }
    }

    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementId>, Error> {
        let compiled = Self::compile(selector)?;
        let nodes: Vec<_> = self
            .html
            .select(&compiled)
            .map(|element| element.id())
            .collect();
        Ok(nodes.into_iter().map(|node| self.register(node)).collect())
    }

    fn find_in(&mut self, parent: &ElementId, selector: &str) -> Result<ElementId, Error> {
        let compiled = Self::compile(selector)?;
        let node = self
            .resolve(parent)?
            .select(&compiled)
            .next()
            .map(|element| element.id());
        match node {
            Some(node) => Ok(self.register(node)),
            None => Err(Error::ElementNotFound {
                selector: selector.to_owned(),
            }),
        }
    }

    fn text(&mut self, element: &ElementId) -> Result<String, Error> {
        Ok(self.resolve(element)?.text().collect())
    }

    fn class_list(&mut self, element: &ElementId) -> Result<Vec<String>, Error> {
        Ok(self
            .resolve(element)?
            .value()
            .attr("class")
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="outer first"><span class="num">12,345</span></div>
          <div class="outer"><span class="num"> 678 </span></div>
        </body></html>
    "#;

    #[test]
    fn finds_elements_in_document_order() {
        let mut dom = SnapshotDom::from_html(PAGE);
        let all = dom.find_all(".outer").unwrap();
        assert_eq!(2, all.len());
        assert_eq!(
            vec!["outer".to_owned(), "first".to_owned()],
            dom.class_list(&all[0]).unwrap()
        );
        let first = dom.find(".outer").unwrap();
        assert_eq!(dom.class_list(&all[0]).unwrap(), dom.class_list(&first).unwrap());
    }

    #[test]
    fn scoped_lookup_and_text() {
        let mut dom = SnapshotDom::from_html(PAGE);
        let items = dom.find_all(".outer").unwrap();
        let num = dom.find_in(&items[1], ".num").unwrap();
        assert_eq!(" 678 ", dom.text(&num).unwrap());
    }

    #[test]
    fn missing_elements_and_bad_selectors() {
        let mut dom = SnapshotDom::from_html(PAGE);
        match dom.find(".nope") {
            Err(Error::ElementNotFound { selector }) => assert_eq!(".nope", selector),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(dom.find_all(".nope").unwrap().is_empty());
        match dom.wait_for(".nope", Duration::from_secs(5)) {
            Err(Error::RenderTimeout { selector, .. }) => assert_eq!(".nope", selector),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(dom.find("??"), Err(Error::Selector { .. })));
    }

    #[test]
    fn class_list_of_classless_element_is_empty() {
        let mut dom = SnapshotDom::from_html("<html><body><p>x</p></body></html>");
        let p = dom.find("p").unwrap();
        assert!(dom.class_list(&p).unwrap().is_empty());
    }
}
