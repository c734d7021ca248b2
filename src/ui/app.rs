//! The interactive terminal application.
//!
//! One render/input loop over the session controller: controller events
//! are drained every turn, keys translate into controller intents, and
//! the view is a pure function of controller state plus list cursors.

use crate::aws;
use crate::browser;
use crate::catalog::MAX_ACCOUNTS_FOR_ROLE_LOADING;
use crate::error::{Result, SeshError};
use crate::models::SsoProfile;
use crate::session::{Event, SessionController, SessionState};
use catppuccin::Flavor;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use tokio::sync::mpsc::UnboundedReceiver;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FALLBACK_ROLE: &str = "AdministratorAccess";

fn cat_color(color: catppuccin::Color) -> Color {
    Color::Rgb(color.rgb.r, color.rgb.g, color.rgb.b)
}

/// Fields of the add/edit profile form, in focus order.
#[derive(Debug, Default)]
struct ProfileForm {
    alias: String,
    tenant: String,
    sso_region: String,
    default_region: String,
    focus: usize,
    error: Option<String>,
}

impl ProfileForm {
    const FIELDS: usize = 4;

    fn from_profile(profile: &SsoProfile) -> Self {
        let tenant = profile
            .start_url
            .trim_start_matches("https://")
            .trim_end_matches(".awsapps.com/start")
            .to_string();
        Self {
            alias: profile.name.clone(),
            tenant,
            sso_region: profile.sso_region.clone(),
            default_region: profile.default_region.clone(),
            ..Self::default()
        }
    }

    fn field_mut(&mut self, idx: usize) -> Option<&mut String> {
        match idx {
            0 => Some(&mut self.alias),
            1 => Some(&mut self.tenant),
            2 => Some(&mut self.sso_region),
            3 => Some(&mut self.default_region),
            _ => None,
        }
    }

    fn validate(&self) -> std::result::Result<SsoProfile, String> {
        if self.alias.trim().is_empty() {
            return Err("Alias cannot be empty".to_string());
        }
        if self.tenant.trim().is_empty() {
            return Err("Tenant name cannot be empty".to_string());
        }
        if self.sso_region.trim().is_empty() {
            return Err("SSO region cannot be empty".to_string());
        }
        if self.default_region.trim().is_empty() {
            return Err("Default region cannot be empty".to_string());
        }
        Ok(SsoProfile {
            name: self.alias.trim().to_string(),
            start_url: format!("https://{}.awsapps.com/start", self.tenant.trim()),
            sso_region: self.sso_region.trim().to_string(),
            default_region: self.default_region.trim().to_string(),
        })
    }
}

pub struct App {
    controller: SessionController,
    events_rx: UnboundedReceiver<Event>,
    should_quit: bool,
    tick: usize,
    theme: Flavor,

    profile_list: ListState,
    account_list: ListState,
    role_list: ListState,

    form: ProfileForm,
    editing_original: Option<String>,
    delete_target: Option<String>,
    region_target: Option<String>,
    region_input: String,
}

impl App {
    pub fn new(controller: SessionController, events_rx: UnboundedReceiver<Event>) -> Self {
        let mut profile_list = ListState::default();
        if !controller.profiles().is_empty() {
            profile_list.select(Some(0));
        }

        Self {
            controller,
            events_rx,
            should_quit: false,
            tick: 0,
            theme: catppuccin::PALETTE.mocha,
            profile_list,
            account_list: ListState::default(),
            role_list: ListState::default(),
            form: ProfileForm::default(),
            editing_original: None,
            delete_target: None,
            region_target: None,
            region_input: String::new(),
        }
    }

    /// Run until quit, returning the controller so the caller can print
    /// the session summary after the terminal is restored.
    pub async fn run(mut self) -> Result<SessionController> {
        enable_raw_mode().map_err(SeshError::Io)?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).map_err(SeshError::Io)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).map_err(SeshError::Io)?;

        self.select_last_used_profile();

        let result = self.event_loop(&mut terminal).await;

        disable_raw_mode().map_err(SeshError::Io)?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen).map_err(SeshError::Io)?;
        terminal.show_cursor().map_err(SeshError::Io)?;

        result?;
        Ok(self.controller)
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.controller.handle_event(event);
            }
            self.clamp_selections();

            terminal.draw(|f| self.render(f)).map_err(SeshError::Io)?;

            if event::poll(std::time::Duration::from_millis(100)).map_err(SeshError::Io)? {
                if let TermEvent::Key(key) = event::read().map_err(SeshError::Io)? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key).await;
                    }
                }
            }

            self.tick = self.tick.wrapping_add(1);
            if self.should_quit {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Input.
    // ------------------------------------------------------------------

    async fn handle_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // Any keypress dismisses a lingering error banner.
        if self.controller.error_message().is_some() {
            self.controller.clear_error();
        }

        match self.controller.state() {
            SessionState::SelectProfile => self.key_select_profile(key).await,
            SessionState::SelectAccount => self.key_select_account(key),
            SessionState::SelectRole => self.key_select_role(key),
            SessionState::SessionActive => self.key_session_active(key),
            SessionState::AddProfile | SessionState::EditProfile => self.key_profile_form(key),
            SessionState::DeleteConfirm => self.key_delete_confirm(key),
            SessionState::SetAccountRegion => self.key_region_input(key),
        }
    }

    async fn key_select_profile(&mut self, key: KeyEvent) {
        let count = self.controller.profiles().len();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.profile_list, count, -1),
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.profile_list, count, 1),
            KeyCode::Char('a') => {
                self.form = ProfileForm::default();
                self.controller.begin_add_profile();
            }
            KeyCode::Char('e') => {
                if let Some(profile) = self.selected_profile_item() {
                    self.form = ProfileForm::from_profile(&profile);
                    self.editing_original = Some(profile.name);
                    self.controller.begin_edit_profile();
                }
            }
            KeyCode::Char('d') => {
                if let Some(profile) = self.selected_profile_item() {
                    self.delete_target = Some(profile.name);
                    self.controller.begin_delete_profile();
                }
            }
            KeyCode::Char('o') => {
                if let Some(profile) = self.selected_profile_item() {
                    let url = aws::dashboard_url(&profile.start_url);
                    if let Err(e) = browser::open(&url) {
                        tracing::warn!("failed to open dashboard: {e}");
                    }
                }
            }
            KeyCode::Enter => {
                if let Some(profile) = self.selected_profile_item() {
                    if let Err(e) = self.controller.select_profile(&profile.name).await {
                        tracing::warn!("profile selection failed: {e}");
                    }
                    self.select_last_used_account();
                }
            }
            _ => {}
        }
    }

    fn key_select_account(&mut self, key: KeyEvent) {
        let count = self.controller.catalog().len();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => self.controller.escape(),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.account_list, count, -1),
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.account_list, count, 1),
            KeyCode::Char('r') => {
                if let Some(name) = self.selected_account_name() {
                    self.region_input = self
                        .controller
                        .catalog()
                        .get_by_name(&name)
                        .and_then(|a| a.region.clone())
                        .unwrap_or_default();
                    self.region_target = Some(name);
                    self.controller.begin_set_account_region();
                }
            }
            KeyCode::Char('o') => {
                if let Some(name) = self.selected_account_name() {
                    self.open_console_for_account(&name);
                }
            }
            KeyCode::Enter => {
                if let Some(name) = self.selected_account_name() {
                    match self.controller.select_account(&name) {
                        Ok(()) => self.select_last_used_role(),
                        Err(e) => tracing::warn!("account selection failed: {e}"),
                    }
                }
            }
            _ => {}
        }
    }

    fn key_select_role(&mut self, key: KeyEvent) {
        if self.controller.loading_text().is_some() {
            if key.code == KeyCode::Esc {
                self.controller.escape();
            }
            return;
        }

        let count = self
            .controller
            .selected_account()
            .map(|a| a.display_roles().len())
            .unwrap_or(0);
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => self.controller.escape(),
            KeyCode::Up | KeyCode::Char('k') => move_selection(&mut self.role_list, count, -1),
            KeyCode::Down | KeyCode::Char('j') => move_selection(&mut self.role_list, count, 1),
            KeyCode::Char('o') => {
                if let (Some(role), Some(account), Some(profile)) = (
                    self.selected_role_name(),
                    self.controller.selected_account(),
                    self.controller.selected_profile(),
                ) {
                    let url =
                        aws::console_url(&profile.start_url, &account.account_id, &role);
                    if let Err(e) = browser::open(&url) {
                        tracing::warn!("failed to open console: {e}");
                    }
                }
            }
            KeyCode::Enter => {
                if let Some(role) = self.selected_role_name() {
                    if let Err(e) = self.controller.confirm_role(&role) {
                        tracing::warn!("role confirmation failed: {e}");
                    }
                }
            }
            _ => {}
        }
    }

    fn key_session_active(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => self.controller.escape(),
            _ => {}
        }
    }

    fn key_profile_form(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.editing_original = None;
                self.controller.escape();
            }
            KeyCode::Tab | KeyCode::Down => {
                self.form.focus = (self.form.focus + 1) % (ProfileForm::FIELDS + 1);
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.form.focus = self
                    .form
                    .focus
                    .checked_sub(1)
                    .unwrap_or(ProfileForm::FIELDS);
            }
            KeyCode::Enter => {
                if self.form.focus < ProfileForm::FIELDS {
                    self.form.focus += 1;
                    return;
                }
                match self.form.validate() {
                    Ok(profile) => {
                        let result = match self.editing_original.take() {
                            Some(original) => self.controller.update_profile(&original, profile),
                            None => self.controller.add_profile(profile),
                        };
                        if let Err(e) = result {
                            self.form.error = Some(e.to_string());
                        }
                    }
                    Err(message) => self.form.error = Some(message),
                }
            }
            KeyCode::Backspace => {
                let focus = self.form.focus;
                if let Some(field) = self.form.field_mut(focus) {
                    field.pop();
                }
            }
            KeyCode::Char(c) => {
                let focus = self.form.focus;
                if let Some(field) = self.form.field_mut(focus) {
                    field.push(c);
                }
            }
            _ => {}
        }
    }

    fn key_delete_confirm(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') => {
                if let Some(name) = self.delete_target.take() {
                    if let Err(e) = self.controller.delete_profile(&name) {
                        tracing::warn!("failed to delete profile: {e}");
                    }
                }
            }
            KeyCode::Char('n') | KeyCode::Esc => {
                self.delete_target = None;
                self.controller.escape();
            }
            _ => {}
        }
    }

    fn key_region_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.region_target = None;
                self.controller.escape();
            }
            KeyCode::Enter => {
                if let Some(name) = self.region_target.take() {
                    let region = self.region_input.trim().to_string();
                    if let Err(e) = self.controller.set_account_region_value(&name, &region) {
                        tracing::warn!("failed to save account region: {e}");
                    }
                }
            }
            KeyCode::Backspace => {
                self.region_input.pop();
            }
            KeyCode::Char(c) => self.region_input.push(c),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Selection helpers.
    // ------------------------------------------------------------------

    fn selected_profile_item(&self) -> Option<SsoProfile> {
        self.profile_list
            .selected()
            .and_then(|idx| self.controller.profiles().get(idx))
            .cloned()
    }

    fn selected_account_name(&self) -> Option<String> {
        self.account_list
            .selected()
            .and_then(|idx| self.controller.catalog().accounts().get(idx))
            .map(|a| a.name.clone())
    }

    fn selected_role_name(&self) -> Option<String> {
        let roles = self.controller.selected_account()?.display_roles();
        self.role_list
            .selected()
            .and_then(|idx| roles.get(idx))
            .cloned()
    }

    fn open_console_for_account(&self, account_name: &str) {
        let (Some(profile), Some(account)) = (
            self.controller.selected_profile(),
            self.controller.catalog().get_by_name(account_name),
        ) else {
            return;
        };

        let role = {
            let saved = self
                .controller
                .store()
                .last_role(&profile.name, account_name)
                .unwrap_or_default();
            if !saved.is_empty() {
                saved
            } else if let Some(first) = account.roles.first() {
                first.clone()
            } else {
                FALLBACK_ROLE.to_string()
            }
        };

        let url = aws::console_url(&profile.start_url, &account.account_id, &role);
        if let Err(e) = browser::open(&url) {
            tracing::warn!("failed to open console: {e}");
        }
    }

    fn select_last_used_profile(&mut self) {
        let last = self.controller.store().last_sso_profile().unwrap_or_default();
        if last.is_empty() {
            return;
        }
        if let Some(idx) = self.controller.profiles().iter().position(|p| p.name == last) {
            self.profile_list.select(Some(idx));
        }
    }

    fn select_last_used_account(&mut self) {
        self.account_list.select(Some(0));
        let Some(profile) = self.controller.selected_profile() else {
            return;
        };
        let last = self
            .controller
            .store()
            .last_account(&profile.name)
            .unwrap_or_default();
        if last.is_empty() {
            return;
        }
        if let Some(idx) = self
            .controller
            .catalog()
            .accounts()
            .iter()
            .position(|a| a.name == last)
        {
            self.account_list.select(Some(idx));
        }
    }

    fn select_last_used_role(&mut self) {
        self.role_list.select(Some(0));
        let (Some(profile), Some(account)) = (
            self.controller.selected_profile(),
            self.controller.selected_account(),
        ) else {
            return;
        };
        let last = self
            .controller
            .store()
            .last_role(&profile.name, &account.name)
            .unwrap_or_default();
        if last.is_empty() {
            return;
        }
        if let Some(idx) = account.display_roles().iter().position(|r| r == &last) {
            self.role_list.select(Some(idx));
        }
    }

    fn clamp_selections(&mut self) {
        clamp(&mut self.profile_list, self.controller.profiles().len());
        clamp(&mut self.account_list, self.controller.catalog().len());
        let roles = self
            .controller
            .selected_account()
            .map(|a| a.display_roles().len())
            .unwrap_or(0);
        clamp(&mut self.role_list, roles);
    }

    // ------------------------------------------------------------------
    // Rendering.
    // ------------------------------------------------------------------

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(2)])
            .split(area);

        match self.controller.state() {
            SessionState::SelectProfile => self.render_profile_list(frame, chunks[0]),
            SessionState::SelectAccount => self.render_account_select(frame, chunks[0]),
            SessionState::SelectRole => self.render_role_select(frame, chunks[0]),
            SessionState::SessionActive => self.render_session_active(frame, chunks[0]),
            SessionState::AddProfile | SessionState::EditProfile => {
                self.render_profile_form(frame, chunks[0])
            }
            SessionState::DeleteConfirm => self.render_delete_confirm(frame, chunks[0]),
            SessionState::SetAccountRegion => self.render_region_input(frame, chunks[0]),
        }

        self.render_status_bar(frame, chunks[1]);
    }

    fn primary(&self) -> Style {
        Style::default().fg(cat_color(self.theme.colors.mauve))
    }

    fn muted(&self) -> Style {
        Style::default().fg(cat_color(self.theme.colors.overlay1))
    }

    fn error_style(&self) -> Style {
        Style::default().fg(cat_color(self.theme.colors.red))
    }

    fn success(&self) -> Style {
        Style::default().fg(cat_color(self.theme.colors.green))
    }

    fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.tick % SPINNER_FRAMES.len()]
    }

    fn titled_block(&self, title: &str) -> Block<'static> {
        Block::default()
            .borders(Borders::ALL)
            .border_style(self.primary())
            .title(format!(" {title} "))
    }

    fn render_profile_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .controller
            .profiles()
            .iter()
            .map(|p| {
                ListItem::new(vec![
                    Line::from(p.name.clone()),
                    Line::from(Span::styled(
                        format!(
                            "  SSO Region: {}, Default Region: {}",
                            p.sso_region, p.default_region
                        ),
                        self.muted(),
                    )),
                ])
            })
            .collect();

        let list = List::new(items)
            .block(self.titled_block("Select AWS SSO Profile"))
            .highlight_style(self.primary().add_modifier(Modifier::BOLD))
            .highlight_symbol("› ");
        frame.render_stateful_widget(list, area, &mut self.profile_list);
    }

    fn render_account_select(&mut self, frame: &mut Frame, area: Rect) {
        if let Some(prompt) = self.controller.device_prompt() {
            let lines = vec![
                Line::from("Your browser should open automatically for SSO login."),
                Line::from("If it doesn't, you can authenticate manually:"),
                Line::from(""),
                Line::from(vec![
                    Span::raw("1. Visit: "),
                    Span::styled(prompt.verification_uri.clone(), self.primary()),
                ]),
                Line::from("2. Enter the following code:"),
                Line::from(""),
                Line::from(Span::styled(
                    format!("   {}   ", prompt.user_code),
                    self.primary().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Or open directly:",
                    self.muted(),
                )),
                Line::from(Span::styled(
                    prompt.verification_uri_complete.clone(),
                    self.primary(),
                )),
                Line::from(""),
                Line::from(format!(
                    "{} {}",
                    self.spinner(),
                    self.controller.loading_text().unwrap_or("Waiting...")
                )),
            ];
            let panel = Paragraph::new(lines)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: false })
                .block(self.titled_block("AWS SSO Login"));
            frame.render_widget(panel, area);
            return;
        }

        if self.controller.catalog().is_empty() {
            let text = self
                .controller
                .loading_text()
                .unwrap_or("No accounts available");
            let panel = Paragraph::new(format!("{} {text}", self.spinner()))
                .alignment(Alignment::Center)
                .block(self.titled_block("Loading"));
            frame.render_widget(panel, area);
            return;
        }

        let profile_name = self
            .controller
            .selected_profile()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let show_roles = self.controller.catalog().len() <= MAX_ACCOUNTS_FOR_ROLE_LOADING;

        let items: Vec<ListItem> = self
            .controller
            .catalog()
            .accounts()
            .iter()
            .map(|account| {
                let region = self.controller.effective_region(account);
                let description = if show_roles {
                    format!(
                        "  Account ID: {}, Region: {}, Roles: {}",
                        account.account_id,
                        region,
                        account.display_roles().join(", ")
                    )
                } else {
                    format!("  Account ID: {}, Region: {}", account.account_id, region)
                };
                ListItem::new(vec![
                    Line::from(account.name.clone()),
                    Line::from(Span::styled(description, self.muted())),
                ])
            })
            .collect();

        let mut title = format!("Select AWS Account for {profile_name}");
        if self.controller.using_cached_accounts() {
            match self.controller.accounts_last_updated() {
                Some(at) => {
                    title.push_str(&format!(" (cached {}, updating...)", at.format("%H:%M")))
                }
                None => title.push_str(" (cached, updating...)"),
            }
        }

        let list = List::new(items)
            .block(self.titled_block(&title))
            .highlight_style(self.primary().add_modifier(Modifier::BOLD))
            .highlight_symbol("› ");
        frame.render_stateful_widget(list, area, &mut self.account_list);
    }

    fn render_role_select(&mut self, frame: &mut Frame, area: Rect) {
        let account_name = self
            .controller
            .selected_account()
            .map(|a| a.name.clone())
            .unwrap_or_default();

        if let Some(text) = self.controller.loading_text() {
            let panel = Paragraph::new(format!("{} {text}", self.spinner()))
                .alignment(Alignment::Center)
                .block(self.titled_block("Loading"));
            frame.render_widget(panel, area);
            return;
        }

        let roles = self
            .controller
            .selected_account()
            .map(|a| a.display_roles())
            .unwrap_or_default();
        let items: Vec<ListItem> = roles.iter().map(|r| ListItem::new(r.clone())).collect();

        let list = List::new(items)
            .block(self.titled_block(&format!("Select Role for {account_name}")))
            .highlight_style(self.primary().add_modifier(Modifier::BOLD))
            .highlight_symbol("› ");
        frame.render_stateful_widget(list, area, &mut self.role_list);
    }

    fn render_session_active(&mut self, frame: &mut Frame, area: Rect) {
        let Some(session) = self.controller.active_session() else {
            return;
        };

        let lines = vec![
            Line::from(vec![
                Span::raw("SSO Profile: "),
                Span::styled(session.profile_name.clone(), self.primary()),
            ]),
            Line::from(vec![
                Span::raw("Account:     "),
                Span::styled(session.account_name.clone(), self.primary()),
                Span::styled(format!(" ({})", session.account_id), self.muted()),
            ]),
            Line::from(vec![
                Span::raw("Role:        "),
                Span::styled(session.role_name.clone(), self.primary()),
            ]),
            Line::from(vec![
                Span::raw("Region:      "),
                Span::styled(session.region.clone(), self.primary()),
            ]),
            Line::from(vec![
                Span::raw("Profile:     "),
                Span::styled(session.credential_profile.clone(), self.primary()),
            ]),
            Line::from(""),
            Line::from(Span::styled(
                "Press ESC to go back or q to quit.",
                self.muted(),
            )),
        ];

        let panel = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(self.success())
                .title(" AWS Session Activated "),
        );
        frame.render_widget(panel, area);
    }

    fn render_profile_form(&mut self, frame: &mut Frame, area: Rect) {
        let title = if self.controller.state() == SessionState::AddProfile {
            "Add New AWS SSO Profile"
        } else {
            "Edit AWS SSO Profile"
        };

        let labels = [
            "Alias (friendly name):",
            "Tenant (e.g. 'acme' from acme.awsapps.com):",
            "SSO Region:",
            "Default Region:",
        ];
        let values = [
            &self.form.alias,
            &self.form.tenant,
            &self.form.sso_region,
            &self.form.default_region,
        ];

        let mut lines = Vec::new();
        for (idx, (label, value)) in labels.iter().zip(values.iter()).enumerate() {
            let label_style = if idx == self.form.focus {
                self.primary()
            } else {
                self.muted()
            };
            lines.push(Line::from(Span::styled(label.to_string(), label_style)));
            let cursor = if idx == self.form.focus { "_" } else { "" };
            lines.push(Line::from(format!("› {value}{cursor}")));
            lines.push(Line::from(""));
        }

        let submit_style = if self.form.focus == ProfileForm::FIELDS {
            self.primary().add_modifier(Modifier::BOLD)
        } else {
            self.muted()
        };
        lines.push(Line::from(Span::styled("[ Submit ]", submit_style)));

        if let Some(error) = &self.form.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(error.clone(), self.error_style())));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab/Shift-Tab to move, Enter to submit, ESC to cancel",
            self.muted(),
        )));

        let panel = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(self.titled_block(title));
        frame.render_widget(panel, area);
    }

    fn render_delete_confirm(&mut self, frame: &mut Frame, area: Rect) {
        let name = self.delete_target.clone().unwrap_or_default();
        let lines = vec![
            Line::from(format!(
                "Are you sure you want to delete the SSO profile '{name}'?"
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("Press ", self.muted()),
                Span::styled("'y'", self.success()),
                Span::styled(" to confirm or ", self.muted()),
                Span::styled("'n'", self.error_style()),
                Span::styled(" to cancel", self.muted()),
            ]),
        ];
        let panel = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(self.titled_block("Delete SSO Profile"));
        frame.render_widget(panel, area);
    }

    fn render_region_input(&mut self, frame: &mut Frame, area: Rect) {
        let name = self.region_target.clone().unwrap_or_default();
        let lines = vec![
            Line::from("Set region for account:"),
            Line::from(Span::styled(name, self.primary())),
            Line::from(""),
            Line::from(format!("› {}_", self.region_input)),
            Line::from(""),
            Line::from(Span::styled(
                "Enter to save (empty clears), ESC to cancel",
                self.muted(),
            )),
        ];
        let panel = Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(self.titled_block("Set Account Region"));
        frame.render_widget(panel, area);
    }

    fn render_status_bar(&mut self, frame: &mut Frame, area: Rect) {
        let mut lines = Vec::new();

        if let Some(error) = self.controller.error_message() {
            lines.push(Line::from(Span::styled(error.to_string(), self.error_style())));
        } else {
            let help = match self.controller.state() {
                SessionState::SelectProfile => {
                    "enter select · a add · e edit · d delete · o dashboard · q quit"
                }
                SessionState::SelectAccount => {
                    "enter select · r set region · o open console · esc back · q quit"
                }
                SessionState::SelectRole => "enter select · o open console · esc back · q quit",
                SessionState::SessionActive => "esc back · q quit",
                _ => "esc cancel",
            };
            lines.push(Line::from(Span::styled(help, self.muted())));
        }

        frame.render_widget(Paragraph::new(lines), area);
    }
}

fn move_selection(state: &mut ListState, count: usize, delta: isize) {
    if count == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(count as isize) as usize;
    state.select(Some(next));
}

fn clamp(state: &mut ListState, count: usize) {
    match state.selected() {
        Some(_) if count == 0 => state.select(None),
        Some(idx) if idx >= count => state.select(Some(count - 1)),
        None if count > 0 => state.select(Some(0)),
        _ => {}
    }
}
