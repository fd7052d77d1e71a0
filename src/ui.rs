use crate::tunnel::{Connection, Tunnel, TunnelField, TunnelKind, TunnelTable};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};
use unicode_width::UnicodeWidthStr;

pub struct AppState {
    pub selected_index: Option<usize>,
    pub list_state: ListState,
    pub show_help: bool,
    pub show_connections: bool,
    pub status_message: String,
    pub last_scan: Option<String>,
}

impl AppState {
    pub fn new(show_connections: bool) -> Self {
        let mut list_state = ListState::default();
        list_state.select(None); // Nothing selected initially

        Self {
            selected_index: None,
            list_state,
            show_help: false,
            show_connections,
            status_message: String::from("Tunnelmon started. Press 'h' for help."),
            last_scan: None,
        }
    }

    pub fn select_next(&mut self, len: usize) {
        if len == 0 {
            return;
        }

        let new_index = match self.selected_index {
            None => 0,
            Some(idx) => (idx + 1) % len,
        };

        self.selected_index = Some(new_index);
        self.list_state.select(Some(new_index));
    }

    pub fn select_previous(&mut self, len: usize) {
        if len == 0 {
            return;
        }

        let new_index = match self.selected_index {
            None => 0,
            Some(0) => len - 1,
            Some(idx) => idx - 1,
        };

        self.selected_index = Some(new_index);
        self.list_state.select(Some(new_index));
    }

    /// Positional indices die with every rebuild; pull the selection back
    /// into range after each scan.
    pub fn clamp_selection(&mut self, len: usize) {
        match self.selected_index {
            Some(_) if len == 0 => {
                self.selected_index = None;
                self.list_state.select(None);
            }
            Some(idx) if idx >= len => {
                self.selected_index = Some(len - 1);
                self.list_state.select(Some(len - 1));
            }
            _ => {}
        }
    }

    pub fn selected_tunnel<'a>(&self, table: &'a TunnelTable) -> Option<&'a Tunnel> {
        self.selected_index.and_then(|idx| table.get(idx))
    }
}

pub fn draw_ui(f: &mut Frame, app: &mut AppState, table: &TunnelTable) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Tunnel list
            Constraint::Length(4), // Status bar (allows wrapping to 2 lines)
        ])
        .split(f.area());

    draw_header(f, chunks[0], app, table);
    draw_tunnel_list(f, chunks[1], app, table);
    draw_status_bar(f, chunks[2], app);

    if app.show_help {
        draw_help_overlay(f, f.area());
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState, table: &TunnelTable) {
    let mut spans = vec![
        Span::styled("Active tunnels: ", Style::default().fg(Color::Cyan)),
        Span::styled(
            table.len().to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" / Active connections: ", Style::default().fg(Color::Cyan)),
        Span::styled(
            table.connection_count().to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    ];
    if let Some(ref stamp) = app.last_scan {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("last scan {}", stamp),
            Style::default().fg(Color::Gray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Tunnelmon - autossh tunnel monitor"),
    );

    f.render_widget(header, area);
}

/// Column width per tunnel field, sized to the widest of label and values,
/// so the list lines up like a table.
fn column_widths(table: &TunnelTable) -> Vec<usize> {
    TunnelField::ALL
        .iter()
        .map(|field| {
            let mut width = field.label().len();
            for tunnel in table.iter() {
                width = width.max(field.extract(tunnel).len());
            }
            width
        })
        .collect()
}

fn field_color(field: TunnelField, kind: TunnelKind) -> Color {
    match field {
        TunnelField::Kind => match kind {
            TunnelKind::Auto { .. } => Color::Blue,
            TunnelKind::Raw => Color::Magenta,
        },
        TunnelField::SshPid => Color::White,
        TunnelField::InPort | TunnelField::OutPort => Color::Yellow,
        TunnelField::ViaHost | TunnelField::TargetHost => Color::Green,
    }
}

fn status_color(conn: &Connection) -> Color {
    if conn.status.is_healthy() {
        Color::Green
    } else {
        Color::Red
    }
}

fn tunnel_line(tunnel: &Tunnel, widths: &[usize], selected: bool) -> Line<'static> {
    // Manual selection indicator - always present for consistent alignment
    let selection_indicator = if selected { "▶ " } else { "  " };

    let mut spans = vec![Span::styled(
        selection_indicator.to_string(),
        Style::default().fg(Color::Yellow),
    )];

    for (field, width) in TunnelField::ALL.iter().zip(widths) {
        spans.push(Span::styled(
            format!("{:<width$} ", field.extract(tunnel), width = width),
            Style::default().fg(field_color(*field, tunnel.kind)),
        ));
    }

    // One tick per connection, colored by its state; "None" when the scan
    // saw no sockets (typically a non-root run).
    if tunnel.connections.is_empty() {
        spans.push(Span::styled("None", Style::default().fg(Color::Red)));
    } else {
        for conn in &tunnel.connections {
            spans.push(Span::styled(
                "|",
                Style::default().fg(status_color(conn)),
            ));
        }
    }

    Line::from(spans)
}

fn connection_line(conn: &Connection) -> Line<'static> {
    let mut spans = vec![
        Span::raw("      + "),
        Span::styled(
            format!("{:<11} ", conn.status.as_str()),
            Style::default().fg(status_color(conn)),
        ),
        Span::styled(
            format!("{:<6} ", conn.family.as_str()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(conn.local_address.clone(), Style::default().fg(Color::Green)),
        Span::raw(":"),
        Span::styled(conn.in_port.to_string(), Style::default().fg(Color::Yellow)),
    ];

    if let (Some(addr), Some(port)) = (conn.foreign_address(), conn.out_port()) {
        spans.push(Span::raw(" -> "));
        spans.push(Span::styled(
            addr.to_string(),
            Style::default().fg(Color::Green),
        ));
        spans.push(Span::raw(":"));
        spans.push(Span::styled(
            port.to_string(),
            Style::default().fg(Color::Yellow),
        ));
    }

    Line::from(spans)
}

fn draw_tunnel_list(f: &mut Frame, area: Rect, app: &mut AppState, table: &TunnelTable) {
    let widths = column_widths(table);

    let items: Vec<ListItem> = table
        .iter()
        .enumerate()
        .map(|(index, tunnel)| {
            let selected = Some(index) == app.list_state.selected();
            let mut lines = vec![tunnel_line(tunnel, &widths, selected)];

            if app.show_connections {
                // Sorting is display-only; the table keeps discovery order.
                let mut connections: Vec<&Connection> = tunnel.connections.iter().collect();
                connections.sort_by_key(|conn| conn.status);
                lines.extend(connections.into_iter().map(connection_line));
            }

            ListItem::new(lines)
        })
        .collect();

    let mut header_spans = vec![Span::raw("  ")];
    for (field, width) in TunnelField::ALL.iter().zip(&widths) {
        header_spans.push(Span::styled(
            format!("{:<width$} ", field.label(), width = width),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }
    header_spans.push(Span::styled(
        "CONNECTIONS",
        Style::default().add_modifier(Modifier::BOLD),
    ));

    // Split the area: header takes first row inside border, list gets the rest
    let header_area = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: 1,
    };

    let list_area = Rect {
        x: area.x + 1,
        y: area.y + 2,
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(3),
    };

    let border = Block::default().borders(Borders::ALL).title("Tunnels");
    f.render_widget(border, area);
    f.render_widget(Paragraph::new(Line::from(header_spans)), header_area);

    let list = List::new(items).highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(list, list_area, &mut app.list_state);
}

/// Wrap spans into multiple lines based on available width, keeping each
/// [key] span together with its description.
fn wrap_spans_to_lines(spans: Vec<Span>, max_width: u16) -> Vec<Line> {
    let mut lines = vec![];
    let mut current_line = vec![];
    let mut current_width = 0;
    let mut i = 0;

    while i < spans.len() {
        let span = &spans[i];
        let span_width = span.content.width() as u16;

        // A yellow key span is measured together with the description that
        // follows it, so the pair never splits across lines.
        let lookahead_width = if span.style.fg == Some(Color::Yellow) && i + 1 < spans.len() {
            span_width + spans[i + 1].content.width() as u16
        } else {
            span_width
        };

        if current_width + lookahead_width > max_width && !current_line.is_empty() {
            lines.push(Line::from(std::mem::take(&mut current_line)));
            current_width = 0;
        }

        current_width += span_width;
        current_line.push(span.clone());
        i += 1;
    }

    if !current_line.is_empty() {
        lines.push(Line::from(current_line));
    }

    if lines.is_empty() {
        lines.push(Line::from(""));
    }

    lines
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &AppState) {
    let mut spans = vec![];

    for (i, (key, description)) in crate::keybindings::get_status_bar_keybindings()
        .iter()
        .enumerate()
    {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            format!("[{}]", key),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::raw(format!(" {}", description)));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        app.status_message.clone(),
        Style::default().fg(Color::Gray),
    ));

    let available_width = area.width.saturating_sub(2); // minus left/right borders
    let wrapped_lines = wrap_spans_to_lines(spans, available_width);
    let status = Paragraph::new(wrapped_lines).block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn draw_help_overlay(f: &mut Frame, area: Rect) {
    let mut help_text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Tunnelmon - Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let bindings = crate::keybindings::get_all_keybindings();
    let mut last_category = None;
    for binding in &bindings {
        if last_category != Some(binding.category) {
            help_text.push(Line::from(""));
            help_text.push(Line::from(Span::styled(
                binding.category.title(),
                Style::default().fg(Color::Cyan),
            )));
            last_category = Some(binding.category);
        }
        help_text.push(Line::from(format!(
            "  {:12} - {}",
            binding.key, binding.description
        )));
    }

    help_text.push(Line::from(""));
    help_text.push(Line::from("Press any key to close"));

    let help_area = centered_rect(60, 60, area);

    let help = Paragraph::new(help_text)
        .style(Style::default().bg(Color::Black).fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .style(Style::default().fg(Color::Cyan)),
        );

    f.render_widget(Clear, help_area);
    f.render_widget(help, help_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
