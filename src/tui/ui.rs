//! UI rendering for the debugger.

use super::app::DebuggerApp;
use crate::cpu::memory::RAM_SIZE;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(frame.area());

    // Left side: code and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: RAM, ports, and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_ram(frame, right_chunks[0], app);
    draw_ports(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly view centered on the PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:04X}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw register and flag state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = &app.cpu.regs;
    let flags = &app.cpu.flags;

    let content = vec![
        Line::from(vec![
            Span::raw("A: "),
            Span::styled(format!("0x{:02X}", regs.a), Style::default().fg(Color::White)),
            Span::raw(format!(" ({:>3})", regs.a)),
            Span::raw("   B: "),
            Span::styled(format!("0x{:02X}", regs.b), Style::default().fg(Color::White)),
            Span::raw(format!(" ({:>3})", regs.b)),
            Span::raw("   X: "),
            Span::styled(format!("0x{:02X}", regs.x), Style::default().fg(Color::White)),
            Span::raw(format!(" ({:>3})", regs.x)),
        ]),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("0x{:04X}", regs.pc), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Flags: "),
            flag_span("Z", flags.zero),
            Span::raw("  "),
            flag_span("M", flags.minus),
            Span::raw("  "),
            flag_span("C", flags.carry),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            if app.cpu.is_halted() {
                Span::styled("Halted", Style::default().fg(Color::Red))
            } else {
                Span::styled("Running", Style::default().fg(Color::Green))
            },
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the scratch-RAM view, highlighting the cell B points at.
fn draw_ram(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.mem_scroll;
    let end = (start + visible_rows).min(RAM_SIZE);

    let items: Vec<ListItem> = (start..end)
        .map(|idx| {
            let value = app.cpu.ram.read(idx as u8);
            let is_b = idx as u8 == app.cpu.regs.b;

            let marker = if is_b { "B▶" } else { "  " };
            let text = format!("{} {:02X}: 0x{:02X} ({})", marker, idx, value, value);

            let style = if is_b {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" RAM ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw output-port latches and the recent write log.
fn draw_ports(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let latches = app
        .cpu
        .ports
        .out
        .iter()
        .map(|value| format!("{:02X}", value))
        .collect::<Vec<_>>()
        .join(" ");

    let mut content = vec![Line::from(vec![
        Span::raw("out: "),
        Span::styled(latches, Style::default().fg(Color::White)),
    ])];

    let log = app.output_log.borrow();
    let visible = (area.height as usize).saturating_sub(3);
    for entry in log.iter().rev().take(visible).rev() {
        content.push(Line::from(Span::styled(
            entry.clone(),
            Style::default().fg(Color::Cyan),
        )));
    }

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Ports ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll RAM  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Style a flag indicator: bright when set, dim when clear.
fn flag_span(name: &'static str, set: bool) -> Span<'static> {
    if set {
        Span::styled(name, Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled(name, Style::default().fg(Color::DarkGray))
    }
}
