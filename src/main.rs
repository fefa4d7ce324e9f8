use caselens::cli::{Cli, Commands, ConfigAction, KindArg, ScopeArg, SettingsAction};
use caselens::config::{Config, IndexBackend};
use caselens::embedding::EmbeddingManager;
use caselens::error::{CaselensError, Result};
use caselens::index::{LocalIndex, VectorStore, WeaviateClient};
use caselens::search::{SearchKind, SearchQuery, SearchResponse, SearchService};
use caselens::settings::{EmbeddingSettings, EMBEDDING_API_KEY};
use caselens::store::{DocumentKind, ImportBundle, SqliteStore};
use caselens::sync::{Indexer, SyncReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Config commands must work with a missing or broken config file
    if let Commands::Config { action } = cli.command {
        init_logging("info", cli.verbose);
        return cmd_config(cli.config, action);
    }

    let config = load_config(cli.config.clone())?;
    init_logging(&config.logging.level, cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            kind,
            limit,
            threshold,
            alpha,
            project,
            module,
            app_version,
            status,
        } => {
            let query = SearchQuery {
                text: query,
                kind: search_kind(kind),
                limit,
                threshold,
                alpha,
                project_id: project,
                module_id: module,
                app_version_id: app_version,
                status,
            };
            cmd_search(&config, query, cli.json).await?;
        }
        Commands::Recommend {
            kind,
            id,
            project,
            limit,
        } => {
            cmd_recommend(&config, document_kind(kind), &id, &project, limit, cli.json).await?;
        }
        Commands::Sync => {
            cmd_sync(&config, cli.json).await?;
        }
        Commands::Import { file, no_index } => {
            cmd_import(&config, &file, no_index).await?;
        }
        Commands::Settings { action } => {
            cmd_settings(&config, action)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("caselens=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("caselens={}", level)))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Store, embedding provider and index wired together for one process
struct App {
    config: Config,
    store: Arc<SqliteStore>,
    embeddings: Arc<EmbeddingManager>,
    index: Arc<dyn VectorStore>,
}

impl App {
    async fn open(config: &Config) -> Result<Self> {
        let db_path = expand_path(&config.storage.database_path)?;
        let store = Arc::new(SqliteStore::open(&db_path)?);

        let embeddings = Arc::new(EmbeddingManager::new(
            config.embedding.request_timeout(),
            config.embedding.local_dimension,
        ));
        embeddings.initialize(&*store).await?;

        let dimension = embeddings
            .current()
            .map(|provider| provider.dimension())
            .unwrap_or(config.embedding.local_dimension);
        let index = open_index(config, dimension)?;

        Ok(Self {
            config: config.clone(),
            store,
            embeddings,
            index,
        })
    }

    /// Open and, for the in-process backend, rebuild the index from the store
    async fn open_warm(config: &Config) -> Result<Self> {
        let app = Self::open(config).await?;
        if config.index.backend == IndexBackend::Local {
            let report = app.indexer().sync_all().await?;
            tracing::debug!(
                "Local index rebuilt: {} PRDs, {} test cases",
                report.prds,
                report.test_cases
            );
        }
        Ok(app)
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(
            Arc::clone(&self.embeddings),
            Arc::clone(&self.index),
            self.store.clone(),
        )
        .with_batch_size(self.config.embedding.batch_size)
    }

    fn search_service(&self) -> SearchService {
        let service = SearchService::new(
            Arc::clone(&self.embeddings),
            Arc::clone(&self.index),
            self.store.clone(),
            self.store.clone(),
        );
        match self.config.search.request_timeout() {
            Some(timeout) => service.with_timeout(timeout),
            None => service,
        }
    }
}

fn open_index(config: &Config, dimension: usize) -> Result<Arc<dyn VectorStore>> {
    match config.index.backend {
        IndexBackend::Local => {
            tracing::debug!("Using local index ({}D)", dimension);
            Ok(Arc::new(LocalIndex::new(dimension, config.index.hnsw)?))
        }
        IndexBackend::Weaviate => {
            let weaviate = &config.index.weaviate;
            tracing::debug!("Using Weaviate at {}", weaviate.url);
            Ok(Arc::new(WeaviateClient::new(
                weaviate.url.clone(),
                weaviate.api_key(),
                Duration::from_secs(weaviate.request_timeout_secs),
            )?))
        }
    }
}

fn search_kind(arg: ScopeArg) -> SearchKind {
    match arg {
        ScopeArg::Prd => SearchKind::Prd,
        ScopeArg::TestCase => SearchKind::TestCase,
        ScopeArg::All => SearchKind::All,
    }
}

fn document_kind(arg: KindArg) -> DocumentKind {
    match arg {
        KindArg::Prd => DocumentKind::Prd,
        KindArg::TestCase => DocumentKind::TestCase,
    }
}

async fn cmd_search(config: &Config, query: SearchQuery, json: bool) -> Result<()> {
    let app = App::open_warm(config).await?;
    let response = app.search_service().search(query).await?;
    print_response(&response, json)
}

async fn cmd_recommend(
    config: &Config,
    kind: DocumentKind,
    id: &str,
    project: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let app = App::open_warm(config).await?;
    let response = app
        .search_service()
        .get_recommendations(project, kind, id, limit)
        .await?;
    print_response(&response, json)
}

async fn cmd_sync(config: &Config, json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let report = app.indexer().sync_all().await?;

    if json {
        println!("{}", to_json(&report, "Failed to serialize sync report")?);
    } else {
        print_report(&report);
        if config.index.backend == IndexBackend::Local {
            println!("  Note: the local index is rebuilt on every run and is not kept");
        }
    }
    Ok(())
}

async fn cmd_import(config: &Config, file: &Path, no_index: bool) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| CaselensError::Io {
        source: e,
        context: format!("Failed to read import file: {:?}", file),
    })?;
    let bundle: ImportBundle = serde_json::from_str(&content).map_err(|e| CaselensError::Json {
        source: e,
        context: format!("Failed to parse import file: {:?}", file),
    })?;

    let app = App::open(config).await?;
    let (prds, test_cases) = app.store.import(&bundle)?;
    println!("✓ Imported {} PRDs and {} test cases", prds, test_cases);

    if no_index || config.index.backend == IndexBackend::Local {
        return Ok(());
    }

    let indexer = app.indexer();
    let mut failed = 0;
    for prd in &bundle.prds {
        if !indexer.index_prd(prd).await? {
            failed += 1;
        }
    }
    for tc in &bundle.test_cases {
        if !indexer.index_test_case(tc).await? {
            failed += 1;
        }
    }

    println!(
        "✓ Indexed {} documents ({} failed)",
        prds + test_cases - failed,
        failed
    );
    Ok(())
}

fn cmd_settings(config: &Config, action: SettingsAction) -> Result<()> {
    let store = SqliteStore::open(&expand_path(&config.storage.database_path)?)?;

    match action {
        SettingsAction::List => {
            for (key, value) in store.list_settings()? {
                println!("{} = {}", key, display_setting(&key, value));
            }
        }
        SettingsAction::Get { key } => match store.get_setting(&key)? {
            Some(value) => println!("{}", display_setting(&key, value)),
            None => println!("Setting '{}' is not set", key),
        },
        SettingsAction::Set { key, value } => {
            store.set_setting(&key, &value)?;
            println!("✓ {} = {}", key, display_setting(&key, value));
        }
    }

    Ok(())
}

fn display_setting(key: &str, value: String) -> String {
    if key == EMBEDDING_API_KEY {
        EmbeddingSettings {
            api_key: value,
            ..Default::default()
        }
        .masked_api_key()
    } else {
        value
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", to_json(&config, "Failed to serialize config")?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Index backend: {}", config.index.backend);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    Config::load_or_default(&path)
}

fn print_response(response: &SearchResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(response, "Failed to serialize search response")?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("No results for {:?}", response.query);
        return Ok(());
    }

    println!("{} results for {:?}\n", response.total, response.query);
    for (rank, result) in response.results.iter().enumerate() {
        let code = result.meta_str("code").unwrap_or("-");
        println!(
            "{:>2}. [{}] {} {} (score {:.3}, retrieval {:.3})",
            rank + 1,
            result.kind,
            code,
            result.title,
            result.score,
            result.vector_score
        );
        for line in result.content.lines() {
            println!("      {}", line);
        }
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("✓ Sync complete in {}ms", report.duration_ms);
    println!("  PRDs: {}", report.prds);
    println!("  Test cases: {}", report.test_cases);
    if report.failed > 0 {
        println!("  Failed: {}", report.failed);
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, context: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| CaselensError::Json {
        source: e,
        context: context.to_string(),
    })
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| CaselensError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| CaselensError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
