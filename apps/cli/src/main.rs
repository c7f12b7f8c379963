use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use quillseo_core_sdk::{
    catalog,
    config::AppConfig,
    db,
    generator::Generator,
    models::{GenerationRequest, Provider},
    probe,
    providers::AdapterSet,
    server, telemetry,
};

/**
 * \brief CLI 程序入口：启动服务或在终端直接调用生成流程。
 */
#[derive(Parser, Debug)]
#[command(name = "quillseo", version, about = "QuillSEO content broker")]
struct Cli {
    /// 输出 debug 级别日志
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 启动 HTTP 服务。
     * \param addr 覆盖 QUILLSEO_ADDR
     * \param db   覆盖 QUILLSEO_DB_PATH
     */
    Serve {
        #[arg(long)]
        addr: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /**
     * \brief 打印模型目录。
     */
    Models,

    /**
     * \brief 用最小请求探测一把凭据是否可用。
     */
    TestKey {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        api_key: String,
    },

    /**
     * \brief 生成一篇内容，保存后以 JSON 打印。
     * \param api_key 缺省时读取 `--user` 已保存的对应服务商凭据
     */
    Generate {
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long, default_value = "default")]
        user: String,
        #[arg(long, default_value = "informative")]
        tone: String,
        #[arg(long, default_value_t = 1000)]
        word_count: u32,
        #[arg(long, default_value_t = false)]
        no_faq: bool,
        #[arg(long, default_value_t = false)]
        no_schema: bool,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /**
     * \brief 列出最近生成的内容。
     */
    History {
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    telemetry::init_tracing(cli.verbose);
    let mut config = AppConfig::from_env().context("load configuration failed")?;
    telemetry::set_log_dir(config.log_dir.clone());
    if telemetry::is_enabled() {
        tracing::debug!(dir = ?config.log_dir, "event log enabled");
    }

    match cli.command {
        Commands::Serve { addr, db: db_path } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            if let Some(path) = db_path {
                config.db_path = path;
            }
            server::run(&config).await?;
        }
        Commands::Models => {
            println!("{}", serde_json::to_string_pretty(&catalog::to_json())?);
        }
        Commands::TestKey {
            provider,
            model,
            api_key,
        } => {
            let adapters = AdapterSet::standard(&config.endpoints, config.provider_timeout)?;
            let outcome = probe::probe(&adapters, &provider, &model, &api_key).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Generate {
            keyword,
            provider,
            model,
            api_key,
            user,
            tone,
            word_count,
            no_faq,
            no_schema,
            db: db_path,
        } => {
            let provider: Provider = provider.parse().map_err(anyhow::Error::msg)?;
            let conn = db::open_db(db_path.unwrap_or(config.db_path)).context("open database failed")?;
            db::migrate(&conn).context("apply migrations failed")?;

            let api_key = match api_key {
                Some(key) => key,
                None => db::stored_api_key(&conn, &user, provider)
                    .context("load settings failed")?
                    .with_context(|| {
                        format!("no --api-key given and no saved {} key for user {}", provider, user)
                    })?,
            };
            let mut request = GenerationRequest::new(keyword, provider, model, api_key);
            request.tone = tone;
            request.word_count = word_count;
            request.include_faq = !no_faq;
            request.include_schema = !no_schema;

            let adapters = AdapterSet::standard(&config.endpoints, config.provider_timeout)?;
            let generator = Generator::new(adapters);
            let doc = generator.generate(&request).await?;
            db::insert_content(&conn, &doc).context("save content failed")?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::History { limit, db: db_path } => {
            let conn = db::open_db(db_path.unwrap_or(config.db_path)).context("open database failed")?;
            db::migrate(&conn).context("apply migrations failed")?;
            let docs = db::list_recent_content(&conn, limit).context("load history failed")?;
            if docs.is_empty() {
                println!("No content generated yet.");
            }
            for doc in docs {
                println!(
                    "{}  {}  [{}/{}]  {} words  {}",
                    doc.created_at, doc.id, doc.provider, doc.model, doc.word_count, doc.title
                );
            }
        }
    }

    Ok(())
}
