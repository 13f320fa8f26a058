//! Pipeline orchestration.
//!
//! [`Harvester`] owns the configuration, the data directory and the
//! navigation driver, and exposes one method per pipeline stage:
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | [`run_full_crawl_and_retry_ladder`](Harvester::run_full_crawl_and_retry_ladder) | site | `products.json`, `canonical-records.json`, `failed-targets.json` |
//! | [`retry_failed`](Harvester::retry_failed) | `failed-targets.json` | `canonical-records.json`, `failed-targets.json` |
//! | [`run_category_product_discovery`](Harvester::run_category_product_discovery) | site | `catalog-tree.json` |
//! | [`merge_category_products_to_flat_list`](Harvester::merge_category_products_to_flat_list) | `catalog-tree.json` | `products-merged.json` |
//! | [`enrich_internal_links_with_content`](Harvester::enrich_internal_links_with_content) | `products-merged.json`, site | `internal-content.json` |
//! | [`sync_json_store_to_repository`](Harvester::sync_json_store_to_repository) | `canonical-records.json` | repository |
//! | [`build_vector_index`](Harvester::build_vector_index) | `canonical-records.json` | `vector-index.json` |
//! | [`answer`](Harvester::answer) | `vector-index.json` | nothing |
//!
//! Stages that browse open one driver session, run to completion over
//! their whole input, and close the session on every exit path. Per-item
//! failures are logged and skipped; only persistence and setup errors end a
//! stage early.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::driver::{DriverSession, HttpDriver, NavigationDriver};
use crate::error::{NavigationError, PersistError};
use crate::extract::Extractor;
use crate::generation::{self, GenerationProvider};
use crate::links::{dedup_by_url, harvest_links_html, harvest_text_html};
use crate::models::{CategoryNode, CrawlTarget, FailedTarget, InternalDocument, ProductNode};
use crate::persist::{self, DataDir, JsonFile};
use crate::repository::Repository;
use crate::retrieval::{self, Answer, VectorIndex};
use crate::retry::{FailedQueue, LadderReport, PassReport, TieredRetryController};
use crate::store::{CanonicalStore, ProductLinkStore};

/// What a full crawl did.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub categories: usize,
    pub products: usize,
    pub ladder: LadderReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichSummary {
    pub products: usize,
    pub documents: usize,
    pub skipped: usize,
}

pub struct Harvester {
    config: Config,
    data: DataDir,
    driver: Arc<dyn NavigationDriver>,
    generator: Option<Arc<dyn GenerationProvider>>,
}

impl Harvester {
    pub fn new(config: Config, driver: Arc<dyn NavigationDriver>) -> Self {
        let data = DataDir::new(&config.storage.data_dir);
        Self {
            config,
            data,
            driver,
            generator: None,
        }
    }

    /// HTTP driver and the configured generation provider.
    pub fn from_config(config: Config) -> Result<Self> {
        let driver = Arc::new(HttpDriver::new(&config.navigation.user_agent));
        let generator = generation::create_provider(&config.generation)?;
        Ok(Self::new(config, driver).with_generator(generator.map(Arc::from)))
    }

    pub fn with_generator(mut self, generator: Option<Arc<dyn GenerationProvider>>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data
    }

    fn extractor(&self) -> Result<Extractor> {
        Ok(Extractor::new(self.config.catalog.origin()?))
    }

    /// Timeout for discovery and enrichment page loads.
    fn browse_timeout(&self) -> Option<Duration> {
        match self.config.navigation.retry_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    async fn open_session(&self) -> Result<Box<dyn DriverSession>> {
        self.driver
            .open()
            .await
            .context("Failed to open navigation session")
    }

    async fn load(&self, session: &mut dyn DriverSession, url: &str) -> Result<String, NavigationError> {
        session
            .goto(url, self.config.navigation.wait, self.browse_timeout())
            .await
            .map(|page| page.html)
    }

    // ============ Link Discovery ============

    /// Category links on the catalog start page.
    pub async fn discover_categories(
        &self,
        session: &mut dyn DriverSession,
    ) -> Result<Vec<CrawlTarget>, NavigationError> {
        let start = self
            .config
            .catalog
            .start_url()
            .map_err(|e| NavigationError::InvalidUrl {
                url: self.config.catalog.start_path.clone(),
                reason: e.to_string(),
            })?;
        let html = self.load(session, &start).await?;
        let categories = harvest_links_html(
            &html,
            &self.config.catalog.category_selectors,
            self.config.catalog.base_url(),
        );
        tracing::info!(url = %start, count = categories.len(), "Discovered categories");
        Ok(categories)
    }

    pub async fn discover_products(
        &self,
        session: &mut dyn DriverSession,
        category_url: &str,
        chain: &[String],
    ) -> Result<Vec<CrawlTarget>, NavigationError> {
        let html = self.load(session, category_url).await?;
        let products = harvest_links_html(&html, chain, self.config.catalog.base_url());
        tracing::debug!(category = category_url, count = products.len(), "Discovered products");
        Ok(products)
    }

    pub async fn discover_internal_links(
        &self,
        session: &mut dyn DriverSession,
        product_url: &str,
        chain: &[String],
    ) -> Result<Vec<CrawlTarget>, NavigationError> {
        let html = self.load(session, product_url).await?;
        Ok(harvest_links_html(&html, chain, self.config.catalog.base_url()))
    }

    /// Every product under every category, deduplicated by url.
    async fn discover_product_targets(
        &self,
        session: &mut dyn DriverSession,
    ) -> Result<(usize, Vec<CrawlTarget>)> {
        let categories = self
            .discover_categories(session)
            .await
            .context("Failed to load catalog start page")?;
        let mut products = Vec::new();
        for category in &categories {
            match self
                .discover_products(session, &category.url, &self.config.catalog.product_selectors)
                .await
            {
                Ok(found) => products.extend(found),
                Err(e) => tracing::warn!(category = %category.url, error = %e, "Skipping category"),
            }
        }
        Ok((categories.len(), dedup_by_url(products)))
    }

    // ============ Extraction ============

    /// Discover every product, then extract them through the whole retry ladder.
    pub async fn run_full_crawl_and_retry_ladder(&self) -> Result<CrawlSummary> {
        let mut session = self.open_session().await?;
        let discovered = self.discover_product_targets(session.as_mut()).await;
        session.close().await;
        let (categories, targets) = discovered?;

        let mut products: JsonFile<CrawlTarget> =
            JsonFile::open_or_quarantine(self.data.path(persist::PRODUCTS))?;
        products.replace(targets.clone())?;
        tracing::info!(categories, products = targets.len(), "Product list written");

        let ladder = self.config.ladder()?;
        let extractor = self.extractor()?;
        let controller = TieredRetryController::new(&ladder, &extractor, &self.config.navigation);
        let mut queue = self.failed_queue()?;
        let mut store = self.canonical_store()?;
        let report = controller
            .run(self.driver.as_ref(), &targets, &mut queue, &mut store)
            .await?;

        Ok(CrawlSummary {
            categories,
            products: targets.len(),
            ladder: report,
        })
    }

    /// Replay the failed queue through the retry tiers only.
    pub async fn retry_failed(&self) -> Result<Vec<PassReport>> {
        let ladder = self.config.ladder()?;
        let extractor = self.extractor()?;
        let controller = TieredRetryController::new(&ladder, &extractor, &self.config.navigation);
        let mut queue = self.failed_queue()?;
        let mut store = self.canonical_store()?;
        controller
            .run_retries(self.driver.as_ref(), &mut queue, &mut store)
            .await
    }

    pub fn failed_queue(&self) -> Result<FailedQueue> {
        Ok(FailedQueue::open(self.data.path(persist::FAILED_TARGETS))?)
    }

    pub fn canonical_store(&self) -> Result<CanonicalStore> {
        Ok(CanonicalStore::open(self.data.path(persist::CANONICAL_RECORDS))?)
    }

    pub fn failed_list(&self) -> Result<Vec<FailedTarget>> {
        Ok(self.failed_queue()?.list().to_vec())
    }

    pub fn failed_clear(&self) -> Result<usize> {
        Ok(self.failed_queue()?.clear()?)
    }

    // ============ Catalog tree ============

    /// Walk categories → products → internal links and write the catalog tree.
    pub async fn run_category_product_discovery(&self) -> Result<Vec<CategoryNode>> {
        let mut session = self.open_session().await?;
        let tree = self.walk_catalog(session.as_mut()).await;
        session.close().await;
        let tree = tree?;

        let mut file: JsonFile<CategoryNode> =
            JsonFile::open_or_quarantine(self.data.path(persist::CATALOG_TREE))?;
        file.replace(tree.clone())?;
        Ok(tree)
    }

    async fn walk_catalog(&self, session: &mut dyn DriverSession) -> Result<Vec<CategoryNode>> {
        let catalog = &self.config.catalog;
        let categories = self
            .discover_categories(session)
            .await
            .context("Failed to load catalog start page")?;

        let mut tree = Vec::with_capacity(categories.len());
        for category in categories {
            let products = match self
                .discover_products(session, &category.url, &catalog.product_selectors)
                .await
            {
                Ok(products) => products,
                Err(e) => {
                    tracing::warn!(category = %category.url, error = %e, "Skipping category");
                    continue;
                }
            };

            let mut nodes = Vec::with_capacity(products.len());
            for product in products {
                let internal_links = match self
                    .discover_internal_links(session, &product.url, &catalog.internal_link_selectors)
                    .await
                {
                    Ok(links) => links,
                    Err(e) => {
                        tracing::warn!(product = %product.url, error = %e, "No internal links for product");
                        Vec::new()
                    }
                };
                nodes.push(ProductNode {
                    url: product.url,
                    display_name: product.display_name,
                    internal_links,
                });
            }

            tracing::info!(category = %category.url, products = nodes.len(), "Category walked");
            tree.push(CategoryNode {
                url: category.url,
                display_name: category.display_name,
                products: nodes,
            });
        }
        Ok(tree)
    }

    /// Flatten the catalog tree into the merged product list. Returns the merged count.
    pub fn merge_category_products_to_flat_list(&self) -> Result<usize> {
        let tree: JsonFile<CategoryNode> = JsonFile::open(self.data.path(persist::CATALOG_TREE))?;
        let mut merged = ProductLinkStore::open(self.data.path(persist::PRODUCTS_MERGED))?;
        merged.merge(
            tree.into_items()
                .into_iter()
                .flat_map(|category| category.products),
        )?;
        tracing::info!(products = merged.len(), "Merged product list written");
        Ok(merged.len())
    }

    /// Fetch the text of every internal link of every merged product.
    pub async fn enrich_internal_links_with_content(&self) -> Result<EnrichSummary> {
        let merged = ProductLinkStore::open(self.data.path(persist::PRODUCTS_MERGED))?;
        let products = merged.all().to_vec();

        let mut session = self.open_session().await?;
        let (documents, skipped) = self.fetch_documents(session.as_mut(), &products).await;
        session.close().await;

        let mut file: JsonFile<InternalDocument> =
            JsonFile::open_or_quarantine(self.data.path(persist::INTERNAL_CONTENT))?;
        let summary = EnrichSummary {
            products: products.len(),
            documents: documents.len(),
            skipped,
        };
        file.replace(documents)?;
        Ok(summary)
    }

    async fn fetch_documents(
        &self,
        session: &mut dyn DriverSession,
        products: &[ProductNode],
    ) -> (Vec<InternalDocument>, usize) {
        let mut documents = Vec::new();
        let mut skipped = 0;
        for product in products {
            for link in &product.internal_links {
                let html = match self.load(session, &link.url).await {
                    Ok(html) => html,
                    Err(e) => {
                        tracing::warn!(url = %link.url, error = %e, "Skipping internal document");
                        skipped += 1;
                        continue;
                    }
                };
                match harvest_text_html(&html, &self.config.catalog.content_selectors) {
                    Some(content) => documents.push(InternalDocument {
                        url: link.url.clone(),
                        link_text: link.display_name.clone(),
                        product_url: product.url.clone(),
                        content,
                    }),
                    None => {
                        tracing::warn!(url = %link.url, "Internal document has no content");
                        skipped += 1;
                    }
                }
            }
        }
        (documents, skipped)
    }

    // ============ Repository ============

    /// Push every canonical record into `repo`. `true` when every save succeeded.
    pub async fn sync_json_store_to_repository(&self, repo: &dyn Repository) -> Result<bool> {
        let store = self.canonical_store()?;
        let mut all_saved = true;
        let mut created = 0usize;
        let mut updated = 0usize;

        for record in store.all() {
            let result = async {
                match repo.find_one_by_url(&record.url).await? {
                    Some(mut entity) => {
                        entity.apply(record)?;
                        repo.save(&entity).await?;
                        Ok::<bool, anyhow::Error>(false)
                    }
                    None => {
                        let entity = repo.create(record)?;
                        repo.save(&entity).await?;
                        Ok(true)
                    }
                }
            }
            .await;

            match result {
                Ok(true) => created += 1,
                Ok(false) => updated += 1,
                Err(e) => {
                    all_saved = false;
                    tracing::warn!(url = %record.url, error = %e, "Failed to save record");
                }
            }
        }

        tracing::info!(created, updated, ok = all_saved, "Repository sync finished");
        Ok(all_saved)
    }

    // ============ Retrieval ============

    pub fn load_index(&self) -> Result<Option<VectorIndex>> {
        Ok(persist::load_document(&self.data.path(persist::VECTOR_INDEX))?)
    }

    /// Embed the canonical store and write the vector index.
    pub async fn build_vector_index(&self) -> Result<VectorIndex> {
        let store = self.canonical_store()?;
        let records = store.all();
        let path = self.data.path(persist::VECTOR_INDEX);
        let previous = match persist::load_document::<VectorIndex>(&path) {
            Ok(previous) => previous,
            Err(PersistError::Malformed { source, .. }) => {
                let quarantined = persist::quarantine(&path)?;
                tracing::warn!(
                    moved_to = %quarantined.display(),
                    error = %source,
                    "Malformed vector index quarantined, rebuilding"
                );
                None
            }
            Err(e) => return Err(e.into()),
        };

        let (provider, vocabulary) = retrieval::index_provider(&self.config.embedding, records)?;
        let index = retrieval::build_index(
            provider.as_ref(),
            vocabulary.as_ref(),
            records,
            previous.as_ref(),
        )
        .await?;

        persist::save_document(&path, &index)?;
        Ok(index)
    }

    /// Answer `question` from the indexed corpus.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let index = self
            .load_index()?
            .ok_or_else(|| anyhow::anyhow!("No vector index found; run `harvest index` first"))?;
        let embedder = retrieval::query_provider(&index, &self.config.embedding)?;
        retrieval::answer(
            &index,
            embedder.as_ref(),
            self.generator.as_deref(),
            &self.config.generation.system_prompt,
            question,
            self.config.generation.top_k,
        )
        .await
    }
}
