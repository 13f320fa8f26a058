//! DOM-query capability used by extraction and link discovery.
//!
//! Extraction never talks to a browser. It runs selector queries against a
//! [`DomDocument`], which any page source can provide: the bundled
//! [`HtmlDocument`] parses a rendered HTML snapshot with `scraper`, and tests
//! can supply their own fixtures.
//!
//! Invalid selectors are a soft failure: the query logs at `debug` and
//! matches nothing, so one bad selector never aborts a whole record.

use scraper::{ElementRef, Html, Selector};

/// An element handle that supports scoped selector queries.
pub trait DomNode: Sized {
    /// All descendants matching `selector`, in document order.
    fn select_all(&self, selector: &str) -> Vec<Self>;
    /// Concatenated text content, untrimmed.
    fn text(&self) -> String;
    fn attr(&self, name: &str) -> Option<String>;
}

/// A page that can be queried by selector.
pub trait DomDocument {
    type Node<'a>: DomNode
    where
        Self: 'a;

    fn root(&self) -> Self::Node<'_>;

    fn element_by_id(&self, id: &str) -> Option<Self::Node<'_>>;

    fn select_all(&self, selector: &str) -> Vec<Self::Node<'_>> {
        self.root().select_all(selector)
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A parsed HTML snapshot.
///
/// `scraper::Html` is not `Send`, so documents are built and dropped inside
/// synchronous extraction code and never held across an `.await`.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }
}

/// Element handle into an [`HtmlDocument`].
#[derive(Clone, Copy)]
pub struct HtmlNode<'a>(ElementRef<'a>);

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!(selector, error = ?e, "Unparseable selector, treating as no match");
            None
        }
    }
}

impl DomNode for HtmlNode<'_> {
    fn select_all(&self, selector: &str) -> Vec<Self> {
        match parse_selector(selector) {
            Some(parsed) => self.0.select(&parsed).map(HtmlNode).collect(),
            None => Vec::new(),
        }
    }

    fn text(&self) -> String {
        self.0.text().collect()
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.0.value().attr(name).map(str::to_string)
    }
}

impl DomDocument for HtmlDocument {
    type Node<'a> = HtmlNode<'a>;

    fn root(&self) -> HtmlNode<'_> {
        HtmlNode(self.html.root_element())
    }

    fn element_by_id(&self, id: &str) -> Option<HtmlNode<'_>> {
        let with_id = parse_selector("[id]")?;
        self.html
            .select(&with_id)
            .find(|el| el.value().id() == Some(id))
            .map(HtmlNode)
    }

    fn select_all(&self, selector: &str) -> Vec<HtmlNode<'_>> {
        match parse_selector(selector) {
            Some(parsed) => self.html.select(&parsed).map(HtmlNode).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="card" id="first"><h3> One </h3><a href="/one">go</a></div>
          <div class="card"><h3>Two</h3></div>
          <section id="panel-1">Panel   body</section>
        </body></html>
    "#;

    #[test]
    fn test_scoped_select() {
        let doc = HtmlDocument::parse(PAGE);
        let cards = doc.select_all(".card");
        assert_eq!(cards.len(), 2);
        let headings = cards[1].select_all("h3");
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].text(), "Two");
    }

    #[test]
    fn test_attr_and_id_lookup() {
        let doc = HtmlDocument::parse(PAGE);
        let link = &doc.select_all("a")[0];
        assert_eq!(link.attr("href").as_deref(), Some("/one"));
        assert_eq!(link.attr("title"), None);

        let panel = doc.element_by_id("panel-1").unwrap();
        assert_eq!(collapse_whitespace(&panel.text()), "Panel body");
        assert!(doc.element_by_id("missing").is_none());
    }

    #[test]
    fn test_invalid_selector_matches_nothing() {
        let doc = HtmlDocument::parse(PAGE);
        assert!(doc.select_all("div[[").is_empty());
        assert!(doc.root().select_all(":::").is_empty());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
