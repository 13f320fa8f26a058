#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use catalog_harvest::config::Config;
use catalog_harvest::driver::{DriverSession, NavigationDriver, RenderedPage, WaitPolicy};
use catalog_harvest::error::NavigationError;
use catalog_harvest::generation::GenerationProvider;

pub const BASE: &str = "https://shop.test";

/// Serves fixture HTML by url; anything else is a 404.
#[derive(Clone, Default)]
pub struct FakeSite {
    pages: Arc<Mutex<HashMap<String, String>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    visits: Arc<Mutex<Vec<String>>>,
}

impl FakeSite {
    pub fn page(&self, path: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(format!("{BASE}{path}"), html.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.pages.lock().unwrap().remove(&format!("{BASE}{path}"));
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

#[async_trait]
impl NavigationDriver for FakeSite {
    async fn open(&self) -> anyhow::Result<Box<dyn DriverSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            site: self.clone(),
            open: true,
        }))
    }
}

struct FakeSession {
    site: FakeSite,
    open: bool,
}

#[async_trait]
impl DriverSession for FakeSession {
    async fn goto(
        &mut self,
        url: &str,
        _wait: WaitPolicy,
        _timeout: Option<Duration>,
    ) -> Result<RenderedPage, NavigationError> {
        assert!(self.open, "goto on a closed session");
        self.site.visits.lock().unwrap().push(url.to_string());
        let html = self.site.pages.lock().unwrap().get(url).cloned();
        match html {
            Some(html) => Ok(RenderedPage { html }),
            None => Err(NavigationError::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.site.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Echoes the prompt it was given.
pub struct EchoGenerator;

#[async_trait]
impl GenerationProvider for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        Ok(user_prompt.to_string())
    }
}

pub fn config(root: &Path) -> Config {
    let src = format!(
        r#"
[catalog]
base_url = "{BASE}/"

[storage]
data_dir = "{}"

[db]
path = "{}"
"#,
        root.join("data").display(),
        root.join("harvest.sqlite").display()
    );
    toml::from_str(&src).unwrap()
}

/// Two categories, three distinct products.
///
/// - `/p/r1` uses the structured template and links one manual.
/// - `/p/r2` uses the legacy template, so only tier 1 extracts it.
/// - `/p/s1` is missing until a test adds it.
pub fn catalog() -> FakeSite {
    let site = FakeSite::default();
    site.page(
        "/",
        r#"<html><body>
            <nav><ul class="category-menu">
                <li><a href="/routers">Routers</a></li>
                <li><a href="/switches">Switches</a></li>
                <li><a href="javascript:void(0)">Menu</a></li>
            </ul></nav>
        </body></html>"#,
    );
    site.page(
        "/routers",
        r#"<html><body><div class="product-grid">
            <div class="product-card"><a href="/p/r1">Router R1</a></div>
            <div class="product-card"><a href="https://shop.testhttps://shop.test/p/r2">Router R2</a></div>
        </div></body></html>"#,
    );
    site.page(
        "/switches",
        r#"<html><body><div class="product-grid">
            <div class="product-card"><a href="/p/s1">Switch S1</a></div>
            <div class="product-card"><a href="/p/r1">Router R1</a></div>
        </div></body></html>"#,
    );
    site.page(
        "/p/r1",
        r#"<html><body>
            <section class="product-hero">
                <span class="product-hero__eyebrow">Routers</span>
                <h1 class="product-hero__title">Router R1</h1>
                <p class="product-hero__description">Fast dual band router with mesh support</p>
            </section>
            <ul class="resource-list"><li><a href="/docs/r1-manual">R1 manual</a></li></ul>
        </body></html>"#,
    );
    site.page(
        "/p/r2",
        r#"<html><body>
            <div class="product-header">
                <span class="category-label">Routers</span>
                <h1>Router R2</h1>
                <h2>Compact travel router</h2>
            </div>
            <div class="product-overview"><p>Pocket sized router with PoE input</p></div>
        </body></html>"#,
    );
    site.page(
        "/docs/r1-manual",
        r#"<html><body><header>Shop</header><main>
            <h1>R1 manual</h1>
            <p>Hold   reset for ten seconds.</p>
        </main></body></html>"#,
    );
    site
}

/// A compact-template page for `/p/s1`.
pub fn add_switch_page(site: &FakeSite) {
    site.page(
        "/p/s1",
        r#"<html><body><div class="compact-product">
            <span class="eyebrow">Switches</span>
            <h1>Switch S1</h1>
            <p class="summary">Managed eight port switch</p>
        </div></body></html>"#,
    );
}
