//! Program pane: disassembly with function entry markers

use crate::interpreter::disasm::Instruction;
use crate::loader::LoadedProgram;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Data needed to render the program pane
pub struct ProgramRenderData<'a> {
    pub program: &'a LoadedProgram,
    pub listing: &'a [Instruction],
    /// Highlighted when the run faulted
    pub failing_ip: Option<usize>,
}

/// Render the disassembly listing
pub fn render_program_pane(
    frame: &mut Frame,
    area: Rect,
    data: ProgramRenderData,
    is_focused: bool,
    scroll_offset: &mut usize,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(format!(
            " Program ({} functions, {} bytes) ",
            data.program.functions.len(),
            data.program.code.len()
        ))
        .borders(Borders::ALL)
        .border_style(border_style);

    let mut all_items = Vec::new();
    for instruction in data.listing {
        for (index, function) in data.program.functions.iter().enumerate() {
            if function.address != instruction.offset {
                continue;
            }
            let args: Vec<String> = function
                .declared_arg_types()
                .map(|kind| kind.to_string())
                .collect();
            let main = if index == data.program.main_index {
                " main"
            } else {
                ""
            };
            all_items.push(ListItem::new(Line::from(Span::styled(
                format!("fn {}({}){}:", index, args.join(", "), main),
                Style::default()
                    .fg(DEFAULT_THEME.function)
                    .add_modifier(Modifier::BOLD),
            ))));
        }

        let style = if Some(instruction.offset) == data.failing_ip {
            Style::default()
                .fg(DEFAULT_THEME.error)
                .bg(DEFAULT_THEME.current_line_bg)
                .add_modifier(Modifier::BOLD)
        } else if instruction.opcode.is_none() {
            Style::default().fg(DEFAULT_THEME.comment)
        } else {
            Style::default().fg(DEFAULT_THEME.fg)
        };
        all_items.push(ListItem::new(format!("  {}", instruction)).style(style));
    }

    if all_items.is_empty() {
        all_items.push(
            ListItem::new("(empty code segment)").style(Style::default().fg(DEFAULT_THEME.comment)),
        );
    }

    let visible_height = area.height.saturating_sub(2).max(1) as usize;
    let max_scroll = all_items.len().saturating_sub(visible_height);
    *scroll_offset = (*scroll_offset).min(max_scroll);

    let visible_items: Vec<ListItem> = all_items
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .collect();

    frame.render_widget(List::new(visible_items).block(block), area);
}
