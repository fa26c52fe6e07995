mod app_service;
mod app_state;
mod commands;
mod ui;

use batchops::alert::AlertDispatcher;
use batchops::config::AppConfig;
use batchops::registry::{default_catalog, load_catalog, JobRegistry};
use batchops::storage;
use batchops::ControlPlane;
use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::app_service::refresh_ui;
use crate::app_state::{App, AppEvent};
use crate::commands::{AppCommand, Console};
use crate::ui::draw;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> io::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("batchops-{}.log", ts));
    let log_file = std::fs::File::create(log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Warn)
        .filter_module("batchops", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    let mut startup_info = Vec::new();
    let cfg = AppConfig::from_env();

    startup_info.push("正在初始化数据库...".to_string());
    let db = match storage::establish_connection(&cfg.database_url, cfg.db_max_connections).await
    {
        Ok(connection) => {
            startup_info.push(format!("✓ 数据库连接成功: {}", cfg.database_url));
            Arc::new(connection)
        }
        Err(e) => {
            eprintln!("无法连接数据库: {}", e);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("数据库连接失败: {}", e),
            ));
        }
    };

    let catalog = match &cfg.jobs_file {
        Some(path) => match load_catalog(path) {
            Ok(defs) => {
                startup_info.push(format!("✓ 读取作业目录: {}", path.display()));
                defs
            }
            Err(e) => {
                startup_info.push(format!("⚠ 作业目录读取失败，使用内置目录: {:#}", e));
                default_catalog()
            }
        },
        None => default_catalog(),
    };
    match JobRegistry::sync(db.as_ref(), &catalog).await {
        Ok(n) => startup_info.push(format!("✓ 已同步 {} 个作业定义", n)),
        Err(e) => startup_info.push(format!("✗ 作业同步失败: {}", e)),
    }

    let dispatcher = match AlertDispatcher::from_config(&cfg.alerts) {
        Ok(d) => d,
        Err(e) => {
            startup_info.push(format!("⚠ 告警通道初始化失败，仅记录告警: {}", e));
            AlertDispatcher::new(Vec::new())
        }
    };
    let channels: Vec<&str> = dispatcher.configured().iter().map(|c| c.as_str()).collect();
    startup_info.push(if channels.is_empty() {
        "⚠ 未配置告警通道".to_string()
    } else {
        format!("✓ 告警通道: {}", channels.join(", "))
    });

    let ops = ControlPlane::new(
        db.clone(),
        Arc::new(dispatcher),
        cfg.idempotency_retention_secs,
    );
    startup_info.push(format!(
        "✓ 操作员: {} ({})",
        cfg.operator_id, cfg.operator_role
    ));

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    // single actor owns the control plane; the UI only sends commands
    let console = Console {
        ops,
        db,
        operator_id: cfg.operator_id.clone(),
        operator_role: cfg.operator_role.clone(),
    };
    let evt_tx_bg = evt_tx.clone();
    tokio::spawn(async move {
        {
            let opsc = console.ops.clone();
            let txc = evt_tx_bg.clone();
            tokio::spawn(async move {
                loop {
                    refresh_ui(&opsc, &txc).await;
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            });
        }

        while let Some(cmd) = cmd_rx.recv().await {
            console.handle(cmd, &evt_tx_bg).await;
        }
    });

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(startup_info, cmd_tx, evt_rx);
    let res = match app.evt_rx.take() {
        Some(rx) => run_app_loop(&mut terminal, &mut app, rx).await,
        None => Ok(()),
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut evt_rx: mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        while let Ok(event) = evt_rx.try_recv() {
            match event {
                AppEvent::Log(msg) | AppEvent::Message(msg) | AppEvent::Error(msg) => {
                    app.add_log(msg)
                }
                AppEvent::Executions(list) => {
                    app.executions_all = list;
                    app.apply_filters();
                    app.clamp_selection();
                }
                AppEvent::Detail(detail) => {
                    app.selected_detail = Some(*detail);
                }
                AppEvent::Stats(stats) => {
                    app.stats = stats;
                }
                AppEvent::Alerts(alerts) => {
                    app.alerts = alerts;
                    app.clamp_selection();
                }
                AppEvent::Audit(entries) => {
                    app.audit_entries = entries;
                }
            }
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key_event(key.code) {
                    return Ok(());
                }
            }
        }
    }
}
