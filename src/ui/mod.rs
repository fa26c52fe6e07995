use crate::app_state::{App, FocusArea, InputMode, ViewMode, MENU_ITEMS};
use batchops::alert::AlertLevel;
use batchops::execution::{Execution, ExecutionStatus, LogLevel};
use chrono::{Local, TimeZone};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Min(8),
        ])
        .split(f.size());

    render_top_bar(f, chunks[0], app);

    let middle_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Horizontal)
        .constraints([Constraint::Length(20), Constraint::Min(0)])
        .split(chunks[1]);

    render_left_menu(f, middle_chunks[0], app);
    render_main_view(f, middle_chunks[1], app);
    render_bottom_bar(f, chunks[2], app);
}

fn status_style(status: ExecutionStatus) -> (&'static str, Color) {
    match status {
        ExecutionStatus::Running => ("▶", Color::Cyan),
        ExecutionStatus::Success => ("✓", Color::Green),
        ExecutionStatus::Failed => ("✗", Color::Red),
        ExecutionStatus::Stopped => ("■", Color::Yellow),
    }
}

fn level_color(level: AlertLevel) -> Color {
    match level {
        AlertLevel::Info => Color::Gray,
        AlertLevel::Warn => Color::Yellow,
        AlertLevel::Error => Color::Red,
        AlertLevel::Critical => Color::LightRed,
    }
}

fn fmt_ts(ts: Option<i64>) -> String {
    ts.and_then(|t| Local.timestamp_opt(t, 0).single())
        .map(|d| d.format("%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn view_block<'a>(app: &App, title: impl Into<Line<'a>>) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(if app.focus_area == FocusArea::MainView {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        })
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(Color::White)
        .add_modifier(Modifier::BOLD)
}

fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let title = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan));

    let open_alerts = app.alerts.iter().filter(|a| !a.is_acknowledged()).count();
    let title_text = Line::from(vec![
        Span::styled(
            " 批处理作业控制台 ",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" - 运行中 {} ", app.stats.running)),
        Span::styled(
            format!(" 未确认告警 {} ", open_alerts),
            Style::default().fg(if open_alerts > 0 {
                Color::Red
            } else {
                Color::Green
            }),
        ),
    ]);

    let paragraph = Paragraph::new(title_text)
        .block(title)
        .alignment(ratatui::layout::Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_left_menu(f: &mut Frame, area: Rect, app: &App) {
    let menu_items: Vec<ListItem> = MENU_ITEMS
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let is_selected = i == app.menu_selected_index;
            let is_active = matches!(
                (i, &app.view_mode),
                (0, ViewMode::Executions)
                    | (1, ViewMode::Overview)
                    | (2, ViewMode::Detail)
                    | (3, ViewMode::Alerts)
                    | (4, ViewMode::Audit)
            );

            let style = if is_selected {
                if app.focus_area == FocusArea::Menu {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD)
                }
            } else if is_active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };

            let prefix = if is_active { "● " } else { "○ " };
            ListItem::new(format!("{}{}", prefix, text)).style(style)
        })
        .collect();

    let title = if app.focus_area == FocusArea::Menu {
        "菜单 (Enter/c 确认)"
    } else {
        "菜单 (← 切换)"
    };

    let menu =
        List::new(menu_items).block(Block::default().borders(Borders::ALL).title(title).style(
            if app.focus_area == FocusArea::Menu {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::White)
            },
        ));

    f.render_widget(menu, area);
}

fn execution_line(exec: &Execution) -> Line<'static> {
    let (symbol, color) = status_style(exec.status);
    Line::from(vec![
        Span::styled(format!("{} ", symbol), Style::default().fg(color)),
        Span::styled(
            format!("{:<8}", exec.status.as_str()),
            Style::default().fg(color),
        ),
        Span::styled(
            format!("{:<7}", exec.run_type.as_str()),
            Style::default().fg(Color::Magenta),
        ),
        Span::raw(format!(
            "{:<22} {:<23} {} {}",
            exec.job_id,
            exec.target.describe(),
            fmt_ts(exec.started_at),
            exec.execution_id
        )),
    ])
}

fn render_main_view(f: &mut Frame, area: Rect, app: &mut App) {
    match app.view_mode {
        ViewMode::Executions => render_executions(f, area, app),
        ViewMode::Overview => render_overview(f, area, app),
        ViewMode::Detail => render_detail(f, area, app),
        ViewMode::Alerts => render_alerts(f, area, app),
        ViewMode::Audit => render_audit(f, area, app),
    }
}

fn render_executions(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .execution_list
        .iter()
        .map(|e| ListItem::new(execution_line(e)))
        .collect();

    let status_filter = app.filter_status.map(|s| s.as_str()).unwrap_or("ALL");
    let query_info = if app.filter_query.is_empty() {
        String::new()
    } else {
        format!(" 搜索: \"{}\"", app.filter_query)
    };
    let title = if app.focus_area == FocusArea::MainView {
        format!(
            "执行列表 [Filter: {}]{} (f 切换, Enter/c 详情, ← 菜单)",
            status_filter, query_info
        )
    } else {
        format!("执行列表 [Filter: {}]{}", status_filter, query_info)
    };

    let list = List::new(items)
        .block(view_block(app, title))
        .highlight_style(highlight())
        .highlight_symbol(">> ");
    app.execution_list_state.select(Some(app.selected_index));
    f.render_stateful_widget(list, area, &mut app.execution_list_state);
}

fn render_overview(f: &mut Frame, area: Rect, app: &App) {
    let stats = &app.stats;
    let unacked = app.alerts.iter().filter(|a| !a.is_acknowledged()).count();
    let content = vec![
        Line::from(vec![Span::styled(
            "--- 执行概览 ---",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(format!("  总计执行: {:>5}", stats.total)),
        Line::from(Span::styled(
            format!("  运行中  : {:>5}", stats.running),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(Span::styled(
            format!("  成功    : {:>5}", stats.success),
            Style::default().fg(Color::Green),
        )),
        Line::from(Span::styled(
            format!("  失败    : {:>5}", stats.failed),
            Style::default().fg(Color::Red),
        )),
        Line::from(Span::styled(
            format!("  已停止  : {:>5}", stats.stopped),
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!("  未确认告警: {:>3}", unacked),
            Style::default().fg(if unacked > 0 { Color::Red } else { Color::Gray }),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "提示: 列表每 2 秒自动刷新",
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(
        Paragraph::new(content).block(view_block(app, "运行概览")),
        area,
    );
}

fn labeled(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{}: ", label),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(value),
    ])
}

fn render_detail(f: &mut Frame, area: Rect, app: &App) {
    let content = if let Some(ref detail) = app.selected_detail {
        let e = &detail.execution;
        let (_, color) = status_style(e.status);
        let mut lines = vec![
            Line::from(vec![
                Span::styled("执行: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(e.execution_id.clone(), Style::default().fg(Color::Cyan)),
            ]),
            Line::from(vec![
                Span::styled("状态: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::styled(e.status.as_str(), Style::default().fg(color)),
                Span::raw(format!("  类型: {}", e.run_type.as_str())),
            ]),
            labeled("作业", e.job_id.clone()),
            labeled("窗口", e.target.describe()),
            labeled(
                "时间",
                format!("{} -> {}", fmt_ts(e.started_at), fmt_ts(e.ended_at)),
            ),
            labeled(
                "计数",
                format!(
                    "处理 {} / 成功 {} / 失败 {}",
                    e.processed_count, e.success_count, e.failed_count
                ),
            ),
        ];
        if let Some(code) = &e.error_code {
            lines.push(Line::from(Span::styled(
                format!(
                    "错误: [{}] {}",
                    code,
                    e.error_message.as_deref().unwrap_or("")
                ),
                Style::default().fg(Color::Red),
            )));
        }
        if let Some(op) = &e.operator_id {
            lines.push(labeled("操作人", op.clone()));
        }
        if let Some(parent) = &e.parent_execution_id {
            lines.push(labeled(
                "重跑自",
                format!(
                    "{} ({})",
                    parent,
                    e.replay_reason.as_deref().unwrap_or("-")
                ),
            ));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("--- 重跑 ({}) ---", detail.replays.len()),
            Style::default().fg(Color::Yellow),
        )));
        for r in &detail.replays {
            lines.push(execution_line(r));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "--- 执行日志 ---",
            Style::default().fg(Color::Yellow),
        )));
        for log in &detail.logs {
            let color = match log.level {
                LogLevel::Info => Color::White,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Error => Color::Red,
            };
            lines.push(Line::from(vec![
                Span::raw(format!("  {} ", fmt_ts(Some(log.created_at)))),
                Span::styled(
                    format!("{:<5} ", log.level.as_str()),
                    Style::default().fg(color),
                ),
                Span::raw(format!(
                    "{}{} {}",
                    log.category,
                    log.code
                        .as_deref()
                        .map(|c| format!("/{}", c))
                        .unwrap_or_default(),
                    log.message
                )),
            ]));
        }
        lines
    } else {
        vec![Line::from("正在加载详情...")]
    };

    let title = if app.focus_area == FocusArea::MainView {
        "执行详情 (↑↓ 滚动, x 返回, ← 切换菜单)"
    } else {
        "执行详情"
    };
    let paragraph = Paragraph::new(content)
        .block(view_block(app, title))
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, area);
}

fn render_alerts(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .alerts
        .iter()
        .map(|a| {
            let color = level_color(a.level);
            let ack = match &a.acknowledged_by {
                Some(by) => format!("✓ {}", by),
                None => "待确认".to_string(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("#{:<4} {:<9}", a.id, a.level.as_str()),
                    Style::default().fg(color),
                ),
                Span::raw(format!(
                    "{:<26} {} {} [{}]",
                    a.alert_type,
                    fmt_ts(Some(a.created_at)),
                    a.title,
                    ack
                )),
            ]))
        })
        .collect();

    let title = if app.focus_area == FocusArea::MainView {
        "告警 (a 确认, ← 菜单)"
    } else {
        "告警"
    };
    let list = List::new(items)
        .block(view_block(app, title))
        .highlight_style(highlight())
        .highlight_symbol(">> ");
    app.alert_list_state.select(Some(app.alert_index));
    f.render_stateful_widget(list, area, &mut app.alert_list_state);
}

fn render_audit(f: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();
    for entry in &app.audit_entries {
        lines.push(Line::from(vec![
            Span::raw(format!("{} ", fmt_ts(Some(entry.created_at)))),
            Span::styled(
                format!("{:<24}", entry.action_type),
                Style::default().fg(Color::Magenta),
            ),
            Span::raw(format!(
                "{}:{} by {}/{} - {}",
                entry.target_type,
                entry.target_id,
                entry.operator_id,
                entry.operator_role,
                entry.reason
            )),
        ]));
    }
    if lines.is_empty() {
        lines.push(Line::from("暂无审计记录，输入 `audit [target]` 加载"));
    }
    let title = format!(
        "审计日志 [{}] (↑↓ 滚动)",
        app.audit_target.as_deref().unwrap_or("全部")
    );
    let paragraph = Paragraph::new(lines)
        .block(view_block(app, title))
        .scroll((app.detail_scroll, 0));
    f.render_widget(paragraph, area);
}

fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let bottom_chunks = Layout::default()
        .direction(ratatui::layout::Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let command_prompt = if app.input_mode == InputMode::Command {
        let mut spans = vec![Span::styled(
            "命令: ",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )];
        let cur = app.command_cursor.min(app.command_input.len());
        let (left, right) = app.command_input.split_at(cur);
        spans.push(Span::raw(left));
        spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
        spans.push(Span::raw(right));

        if let Some(hint) = app.get_completion_hint() {
            spans.push(Span::styled(hint, Style::default().fg(Color::DarkGray)));
        }

        vec![
            Line::from(spans),
            Line::from("Enter执行 Esc取消 Tab补全 ←→光标 Home/End ↑历史 ↓下一条"),
        ]
    } else {
        vec![
            Line::from(vec![
                Span::styled("命令: ", Style::default().fg(Color::Yellow)),
                Span::raw("(按 / 进入命令模式, help 查看命令)"),
            ]),
            Line::from("/命令 f筛选 a确认告警 ←→切换 ↑↓导航 Enter/c确认 x返回 q退出"),
        ]
    };
    let command_paragraph = Paragraph::new(command_prompt).block(
        Block::default()
            .borders(Borders::ALL)
            .title(if app.input_mode == InputMode::Command {
                "命令输入模式"
            } else {
                "命令输入"
            })
            .style(if app.input_mode == InputMode::Command {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            }),
    );
    f.render_widget(command_paragraph, bottom_chunks[0]);

    let log_items: Vec<ListItem> = app
        .log_messages
        .iter()
        .rev()
        .take(20)
        .map(|msg| {
            let style = if msg.starts_with("✓") {
                Style::default().fg(Color::Green)
            } else if msg.starts_with("✗") {
                Style::default().fg(Color::Red)
            } else if msg.starts_with("⚠") {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(msg.as_str()).style(style)
        })
        .collect();

    let log = List::new(log_items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("日志 (共 {} 条)", app.log_messages.len()))
            .style(Style::default().fg(Color::White)),
    );
    f.render_widget(log, bottom_chunks[1]);
}
