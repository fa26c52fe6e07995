use crate::commands::AppCommand;
use batchops::alert::Alert;
use batchops::audit::AuditLogEntry;
use batchops::execution::{Execution, ExecutionLogEntry, ExecutionStats, ExecutionStatus};
use crossterm::event::KeyCode;
use ratatui::widgets::ListState;
use std::str::FromStr;
use tokio::sync::mpsc;

#[derive(PartialEq, Debug, Clone)]
pub enum ViewMode {
    Executions,
    Overview,
    Detail,
    Alerts,
    Audit,
}

pub const MENU_ITEMS: [&str; 5] = ["执行列表", "运行概览", "执行详情", "告警", "审计日志"];

#[derive(PartialEq, Debug, Clone)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FocusArea {
    Menu,
    MainView,
}

/// One execution with its trail and the replays that point at it.
#[derive(Debug, Clone)]
pub struct ExecutionDetail {
    pub execution: Execution,
    pub logs: Vec<ExecutionLogEntry>,
    pub replays: Vec<Execution>,
}

#[derive(Debug)]
pub enum AppEvent {
    Log(String),
    Message(String),
    Error(String),
    Executions(Vec<Execution>),
    Detail(Box<ExecutionDetail>),
    Stats(ExecutionStats),
    Alerts(Vec<Alert>),
    Audit(Vec<AuditLogEntry>),
}

pub struct App {
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub focus_area: FocusArea,
    pub menu_selected_index: usize,
    pub executions_all: Vec<Execution>,
    pub execution_list: Vec<Execution>,
    pub selected_index: usize,
    pub execution_list_state: ListState,
    pub selected_detail: Option<ExecutionDetail>,
    pub stats: ExecutionStats,
    pub alerts: Vec<Alert>,
    pub alert_index: usize,
    pub alert_list_state: ListState,
    pub audit_entries: Vec<AuditLogEntry>,
    pub audit_target: Option<String>,
    pub detail_scroll: u16,
    pub command_input: String,
    pub command_cursor: usize,
    pub command_history: Vec<String>,
    pub command_history_index: Option<usize>,
    pub filter_status: Option<ExecutionStatus>,
    pub filter_query: String,
    pub log_messages: Vec<String>,
    pub cmd_tx: mpsc::UnboundedSender<AppCommand>,
    pub evt_rx: Option<mpsc::UnboundedReceiver<AppEvent>>,
}

impl App {
    pub fn new(
        startup_info: Vec<String>,
        cmd_tx: mpsc::UnboundedSender<AppCommand>,
        evt_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> App {
        let mut log_messages = vec!["控制台已启动".to_string()];
        log_messages.extend(startup_info);

        App {
            view_mode: ViewMode::Executions,
            input_mode: InputMode::Normal,
            focus_area: FocusArea::Menu,
            menu_selected_index: 0,
            executions_all: Vec::new(),
            execution_list: Vec::new(),
            selected_index: 0,
            execution_list_state: selected_state(),
            selected_detail: None,
            stats: ExecutionStats::default(),
            alerts: Vec::new(),
            alert_index: 0,
            alert_list_state: selected_state(),
            audit_entries: Vec::new(),
            audit_target: None,
            detail_scroll: 0,
            command_input: String::new(),
            command_cursor: 0,
            command_history: Vec::new(),
            command_history_index: None,
            filter_status: None,
            filter_query: String::new(),
            log_messages,
            cmd_tx,
            evt_rx: Some(evt_rx),
        }
    }

    pub fn add_log(&mut self, msg: String) {
        self.log_messages.push(msg);
    }

    /// Ghost text shown after the cursor; Tab accepts it.
    pub fn get_completion_hint(&self) -> Option<String> {
        let commands = [
            "start", "progress", "complete", "fail", "stop", "replay", "version", "approval",
            "ack", "detail", "audit", "jobs", "help", "quit", "filter",
        ];
        let input = self.command_input.trim();
        if input.is_empty() {
            return None;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let complete_from = |options: &[&str], cur: &str| {
            options
                .iter()
                .find(|o| o.starts_with(cur) && **o != cur)
                .map(|o| o[cur.len()..].to_string())
        };

        if parts.len() == 1 {
            return match parts[0] {
                "replay" => Some(" full".to_string()),
                "version" => Some(" list".to_string()),
                "approval" => Some(" request".to_string()),
                first => complete_from(&commands, first),
            };
        }
        if parts.len() == 2 {
            let cur = parts[1];
            return match parts[0] {
                "replay" => complete_from(&["full", "range", "single"], cur),
                "version" => complete_from(&["create", "list", "activate"], cur),
                "approval" => complete_from(&["request", "approve", "reject"], cur),
                "start" => self.complete_job_id(cur),
                _ => None,
            };
        }
        if parts.len() == 3 && parts[0] == "replay" {
            return self.complete_job_id(parts[2]);
        }
        None
    }

    fn complete_job_id(&self, cur: &str) -> Option<String> {
        self.executions_all
            .iter()
            .map(|e| e.job_id.as_str())
            .find(|j| j.starts_with(cur) && *j != cur)
            .map(|j| j[cur.len()..].to_string())
    }

    pub fn clamp_selection(&mut self) {
        if self.selected_index >= self.execution_list.len() {
            self.selected_index = self.execution_list.len().saturating_sub(1);
        }
        self.execution_list_state.select(Some(self.selected_index));
        if self.alert_index >= self.alerts.len() {
            self.alert_index = self.alerts.len().saturating_sub(1);
        }
        self.alert_list_state.select(Some(self.alert_index));
    }

    pub fn apply_filters(&mut self) {
        let query = self.filter_query.to_ascii_uppercase();
        self.execution_list = self
            .executions_all
            .iter()
            .filter(|e| self.filter_status.map_or(true, |s| e.status == s))
            .filter(|e| {
                query.is_empty()
                    || e.job_id.contains(&query)
                    || e.execution_id.to_ascii_uppercase().contains(&query)
            })
            .cloned()
            .collect();
        if self.selected_index >= self.execution_list.len() {
            self.selected_index = 0;
        }
        self.execution_list_state.select(Some(self.selected_index));
    }

    pub fn selected_execution(&self) -> Option<&Execution> {
        self.execution_list.get(self.selected_index)
    }

    pub fn request_detail(&mut self) {
        if let Some(exec) = self.selected_execution() {
            let execution_id = exec.execution_id.clone();
            self.detail_scroll = 0;
            let _ = self.cmd_tx.send(AppCommand::Detail { execution_id });
        }
    }

    fn submit_command(&mut self, line: String) {
        if let Some(args) = line.strip_prefix("filter") {
            self.filter_query = match args.trim() {
                "" | "clear" | "--clear" => String::new(),
                q => q.to_string(),
            };
            self.apply_filters();
        } else if let Ok(app_cmd) = AppCommand::from_str(&line) {
            if let AppCommand::Audit { target_id } = &app_cmd {
                self.audit_target = target_id.clone();
                self.view_mode = ViewMode::Audit;
                self.menu_selected_index = 4;
            }
            let _ = self.cmd_tx.send(app_cmd);
        }
        self.command_history.push(line);
        self.command_history_index = None;
    }

    fn leave_command_mode(&mut self) {
        self.command_input.clear();
        self.command_cursor = 0;
        self.input_mode = InputMode::Normal;
    }

    fn handle_command_key(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Enter => {
                let line = self.command_input.trim().to_string();
                if !line.is_empty() && line != "q" {
                    self.submit_command(line);
                }
                self.leave_command_mode();
            }
            KeyCode::Esc => self.leave_command_mode(),
            KeyCode::Tab => {
                if let Some(hint) = self.get_completion_hint() {
                    let insert = format!("{} ", hint);
                    self.command_input.insert_str(self.command_cursor, &insert);
                    self.command_cursor += insert.len();
                }
            }
            KeyCode::Up => {
                if self.command_history.is_empty() {
                    return false;
                }
                let next = match self.command_history_index {
                    None => self.command_history.len() - 1,
                    Some(i) => i.saturating_sub(1),
                };
                self.recall(next);
            }
            KeyCode::Down => match self.command_history_index {
                Some(i) if i + 1 < self.command_history.len() => self.recall(i + 1),
                Some(_) => {
                    self.command_history_index = None;
                    self.command_input.clear();
                    self.command_cursor = 0;
                }
                None => {}
            },
            KeyCode::Backspace => {
                if self.command_cursor > 0 {
                    self.command_cursor -= 1;
                    self.command_input.remove(self.command_cursor);
                }
            }
            KeyCode::Delete => {
                if self.command_cursor < self.command_input.len() {
                    self.command_input.remove(self.command_cursor);
                }
            }
            KeyCode::Left => self.command_cursor = self.command_cursor.saturating_sub(1),
            KeyCode::Right => {
                if self.command_cursor < self.command_input.len() {
                    self.command_cursor += 1;
                }
            }
            KeyCode::Home => self.command_cursor = 0,
            KeyCode::End => self.command_cursor = self.command_input.len(),
            KeyCode::Char(c) if c.is_ascii() => {
                self.command_input.insert(self.command_cursor, c);
                self.command_cursor += 1;
            }
            _ => {}
        }
        false
    }

    fn recall(&mut self, idx: usize) {
        self.command_history_index = Some(idx);
        if let Some(cmd) = self.command_history.get(idx) {
            self.command_input = cmd.clone();
            self.command_cursor = self.command_input.len();
        }
    }

    fn select_menu(&mut self, idx: usize) {
        self.menu_selected_index = idx;
        self.view_mode = match idx {
            0 => ViewMode::Executions,
            1 => ViewMode::Overview,
            2 => {
                self.request_detail();
                ViewMode::Detail
            }
            3 => ViewMode::Alerts,
            _ => {
                let _ = self.cmd_tx.send(AppCommand::Audit {
                    target_id: self.audit_target.clone(),
                });
                ViewMode::Audit
            }
        };
    }

    /// Returns true when the console should exit.
    pub fn handle_key_event(&mut self, key: KeyCode) -> bool {
        if self.input_mode == InputMode::Command {
            return self.handle_command_key(key);
        }

        match key {
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Command;
                self.command_input.clear();
                self.command_cursor = 0;
            }
            KeyCode::Char('q') => return true,
            KeyCode::Left => self.focus_area = FocusArea::Menu,
            KeyCode::Right => self.focus_area = FocusArea::MainView,
            KeyCode::Up => {
                if self.focus_area == FocusArea::Menu {
                    self.menu_selected_index = self.menu_selected_index.saturating_sub(1);
                } else {
                    match self.view_mode {
                        ViewMode::Detail | ViewMode::Audit => {
                            self.detail_scroll = self.detail_scroll.saturating_sub(1)
                        }
                        ViewMode::Alerts => self.alert_index = self.alert_index.saturating_sub(1),
                        _ => self.selected_index = self.selected_index.saturating_sub(1),
                    }
                }
            }
            KeyCode::Down => {
                if self.focus_area == FocusArea::Menu {
                    if self.menu_selected_index < MENU_ITEMS.len() - 1 {
                        self.menu_selected_index += 1;
                    }
                } else {
                    match self.view_mode {
                        ViewMode::Detail | ViewMode::Audit => {
                            self.detail_scroll = self.detail_scroll.saturating_add(1)
                        }
                        ViewMode::Alerts => {
                            if self.alert_index + 1 < self.alerts.len() {
                                self.alert_index += 1;
                            }
                        }
                        _ => {
                            if self.selected_index + 1 < self.execution_list.len() {
                                self.selected_index += 1;
                            }
                        }
                    }
                }
            }
            KeyCode::Enter | KeyCode::Char('c') => {
                if self.focus_area == FocusArea::Menu {
                    self.select_menu(self.menu_selected_index);
                    self.focus_area = FocusArea::MainView;
                } else if self.view_mode == ViewMode::Executions && !self.execution_list.is_empty()
                {
                    self.select_menu(2);
                }
            }
            KeyCode::Char('x') => {
                if self.focus_area == FocusArea::MainView && self.view_mode == ViewMode::Detail {
                    self.view_mode = ViewMode::Executions;
                    self.menu_selected_index = 0;
                }
            }
            KeyCode::Char('a') => {
                if self.view_mode == ViewMode::Alerts {
                    if let Some(alert) = self.alerts.get(self.alert_index) {
                        if !alert.is_acknowledged() {
                            let _ = self.cmd_tx.send(AppCommand::Ack { alert_id: alert.id });
                        }
                    }
                }
            }
            KeyCode::Char('f') => {
                if self.focus_area == FocusArea::MainView && self.view_mode == ViewMode::Executions
                {
                    self.filter_status = match self.filter_status {
                        None => Some(ExecutionStatus::Running),
                        Some(ExecutionStatus::Running) => Some(ExecutionStatus::Failed),
                        Some(ExecutionStatus::Failed) => Some(ExecutionStatus::Stopped),
                        Some(ExecutionStatus::Stopped) => Some(ExecutionStatus::Success),
                        Some(ExecutionStatus::Success) => None,
                    };
                    self.apply_filters();
                }
            }
            _ => {}
        }
        false
    }
}

fn selected_state() -> ListState {
    let mut s = ListState::default();
    s.select(Some(0));
    s
}
