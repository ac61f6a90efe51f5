//! Heap pane rendering: block occupancy map and live allocations
//!
//! The top of the pane draws one cell per block (used or free), so
//! fragmentation is visible at a glance. Below it every live allocation is
//! listed with its address, block count and a hex preview of its first bytes.

use crate::memory::Heap;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

/// Bytes shown in each allocation's hex preview
const PREVIEW_BYTES: usize = 8;

/// Render the heap pane
pub fn render_heap_pane(
    frame: &mut Frame,
    area: Rect,
    heap: &Heap,
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
            " Heap ({}/{} blocks of {} bytes) ",
            heap.used_blocks(),
            heap.total_blocks(),
            heap.block_size()
        ))
        .borders(Borders::ALL)
        .border_style(border_style);

    let content_width = area.width.saturating_sub(2).max(1) as usize;
    let mut all_items = block_map(heap, content_width);

    all_items.push(ListItem::new(""));
    let allocations = heap.live_allocations();
    if allocations.is_empty() {
        all_items.push(
            ListItem::new("(no live allocations)")
                .style(Style::default().fg(DEFAULT_THEME.comment)),
        );
    }

    for allocation in allocations {
        let capacity = allocation.capacity(heap.block_size());
        let shown = capacity.min(PREVIEW_BYTES);
        let preview: Vec<String> = (allocation.address..allocation.address + shown)
            .filter_map(|address| heap.get(address).ok())
            .map(|byte| format!("{:02x}", byte))
            .collect();

        all_items.push(ListItem::new(Line::from(vec![
            Span::styled(
                format!("0x{:08x}", allocation.address),
                Style::default().fg(DEFAULT_THEME.primary),
            ),
            Span::raw(" | "),
            Span::styled(
                format!("{:>4} blk", allocation.blocks),
                Style::default().fg(DEFAULT_THEME.number),
            ),
            Span::raw(" | "),
            Span::styled(preview.join(" "), Style::default().fg(DEFAULT_THEME.fg)),
        ])));
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

/// One row of cells per `width` blocks
fn block_map(heap: &Heap, width: usize) -> Vec<ListItem<'static>> {
    let used = Style::default().fg(DEFAULT_THEME.block_used);
    let free = Style::default().fg(DEFAULT_THEME.block_free);

    (0..heap.total_blocks())
        .collect::<Vec<_>>()
        .chunks(width)
        .map(|row| {
            let cells: Vec<Span> = row
                .iter()
                .map(|&index| {
                    if heap.is_block_used(index) {
                        Span::styled("█", used)
                    } else {
                        Span::styled("·", free)
                    }
                })
                .collect();
            ListItem::new(Line::from(cells))
        })
        .collect()
}
