//! Standalone data collector CLI.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use trader_collector::{functions, CollectorConfig, KrxClient, PgStore};
use trader_sync::{init_logging, DataSync, LogConfig, LogFormat, SyncReport};

#[derive(Parser)]
#[command(name = "trader-collector")]
#[command(about = "ZeroQuant Incremental Data Collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 필터 (trace, debug, info, warn, error 또는 "trader_sync=debug" 형식)
    #[arg(long)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 1회 동기화 실행
    Sync {
        /// 실행할 함수 (쉼표로 구분, 예: "stock_list,stock_daily")
        #[arg(long)]
        functions: Option<String>,

        /// 동시 수집 작업 수
        #[arg(long)]
        fetch_concurrency: Option<usize>,

        /// 동시 저장 작업 수
        #[arg(long)]
        save_concurrency: Option<usize>,
    },

    /// 데몬 모드: 주기적으로 동기화 실행
    Daemon,

    /// 등록된 동기화 함수 목록
    Functions,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    let mut log_config = LogConfig::from_env();
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if let Some(format) = cli.log_format {
        log_config.format = format.parse::<LogFormat>()?;
    }
    init_logging(log_config)?;

    if let Commands::Functions = cli.command {
        for name in functions::FUNCTIONS {
            println!("{}", name);
        }
        return Ok(());
    }

    tracing::info!("ZeroQuant Data Collector 시작");

    // 설정 로드
    let mut config = CollectorConfig::from_env()?;
    if let Commands::Sync {
        functions,
        fetch_concurrency,
        save_concurrency,
    } = &cli.command
    {
        if functions.is_some() {
            config.sync.functions = functions.clone();
        }
        if let Some(n) = fetch_concurrency {
            config.sync.fetch_concurrency = *n;
        }
        if let Some(n) = save_concurrency {
            config.sync.save_concurrency = *n;
        }
    }
    tracing::debug!(sync = ?config.sync, krx = ?config.krx, "설정 로드 완료");

    // DB 연결
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.sync.db_pool_size())
        .connect(&config.database_url)
        .await?;
    tracing::info!("데이터베이스 연결 성공");

    let store = Arc::new(PgStore::new(pool.clone()));
    store.ensure_schema().await?;

    let client = Arc::new(KrxClient::new(
        &config.krx.base_url,
        config.krx.session_pool_size,
    ));
    let services = functions::services(store.clone(), &config.sync)?;
    let sync = functions::build_sync(services, client, &config.sync);

    // 명령 실행
    match cli.command {
        Commands::Sync { .. } => {
            run_once(&sync, &store).await?;
        }
        Commands::Daemon => {
            run_daemon(&sync, &store, &config).await;
        }
        Commands::Functions => {}
    }

    pool.close().await;
    tracing::info!("ZeroQuant Data Collector 종료");

    Ok(())
}

/// 동기화 1회 실행 후 인덱스 재구성.
async fn run_once(sync: &DataSync, store: &PgStore) -> trader_collector::Result<SyncReport> {
    let report = sync.sync().await?;
    report.log_summary("동기화");

    if report.rows_saved > 0 {
        if let Err(e) = store.rebuild_indexes().await {
            tracing::warn!(error = %e, "인덱스 재구성 실패");
        }
    }

    Ok(report)
}

async fn run_daemon(sync: &DataSync, store: &PgStore, config: &CollectorConfig) {
    tracing::info!(
        "=== 데몬 모드 시작 (주기: {}분) ===",
        config.daemon.interval_minutes
    );

    let cancel = sync.cancel_token();
    let mut interval = tokio::time::interval(config.daemon.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("종료 신호 수신, 데몬 종료 중...");
                break;
            }
            _ = interval.tick() => {
                let run = run_once(sync, store);
                tokio::pin!(run);

                tokio::select! {
                    result = &mut run => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "동기화 실패");
                        }
                        tracing::info!(
                            "=== 동기화 완료, 다음 실행: {}분 후 ===",
                            config.daemon.interval_minutes
                        );
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 진행 중인 동기화 취소");
                        cancel.cancel();
                        if let Ok(report) = run.await {
                            tracing::info!(not_scheduled = report.not_scheduled, "취소된 동기화 정리 완료");
                        }
                        break;
                    }
                }
            }
        }
    }
}
