use tiny_skia::{Paint, Color, Rect, Transform, PixmapMut, PathBuilder, Stroke};
use cosmic_text::{Attrs, Buffer, FontSystem, Metrics, SwashCache, Weight};
use crate::state::{self, AppState};
use crate::config::ThemeConfig;

pub const ITEM_HEIGHT: f32 = 44.0;
const QUERY_SIZE: f32 = 20.0;
const NAME_SIZE: f32 = 16.0;
const EXEC_SIZE: f32 = 12.0;

fn list_start_y(theme: &ThemeConfig) -> f32 {
    theme.padding + QUERY_SIZE + theme.spacing
}

/// Rows that fit below the query line.
pub fn visible_rows(height: u32, theme: &ThemeConfig) -> usize {
    let available = height as f32 - list_start_y(theme) - theme.padding;
    (available / ITEM_HEIGHT).max(0.0) as usize
}

pub struct Renderer {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            font_system: FontSystem::new(),
            swash_cache: SwashCache::new(),
        }
    }

    pub fn draw(&mut self, pixmap: &mut PixmapMut, state: &AppState) {
        let theme = &state.config.theme;
        let bg_color = ThemeConfig::parse_color(&theme.background);
        let border_color = ThemeConfig::parse_color(&theme.border_color);

        pixmap.fill(Color::TRANSPARENT);

        let width = pixmap.width() as f32;
        let height = pixmap.height() as f32;

        if let Some(rect) = Rect::from_xywh(0.0, 0.0, width, height) {
            self.draw_rounded_rect(pixmap, rect, theme.border_radius, bg_color, Some(border_color));
        }

        if state.prompt_entry().is_some() {
            self.draw_prompt(pixmap, state);
        } else {
            self.draw_list(pixmap, state);
        }

        if let Some(error) = &state.error {
            let error_color = ThemeConfig::parse_color(&theme.error_color);
            let y = height - theme.padding - NAME_SIZE;
            self.draw_text(pixmap, error, theme.padding, y, 14.0, error_color, Weight::NORMAL);
        }
    }

    fn draw_list(&mut self, pixmap: &mut PixmapMut, state: &AppState) {
        let theme = &state.config.theme;
        let text_color = ThemeConfig::parse_color(&theme.text);
        let exec_color = ThemeConfig::parse_color(&theme.exec_text);
        let sel_bg_color = ThemeConfig::parse_color(&theme.selection_background);
        let sel_text_color = ThemeConfig::parse_color(&theme.selection_text);
        let number_color = ThemeConfig::parse_color(&theme.label_color);
        let width = pixmap.width() as f32;

        let search_y = theme.padding;
        let (search_text, search_color) = if state.query.is_empty() {
            ("Desktop program...".to_string(), exec_color)
        } else {
            (format!("> {}", state.query), text_color)
        };
        self.draw_text(pixmap, &search_text, theme.padding, search_y, QUERY_SIZE, search_color, Weight::NORMAL);

        let list_start_y = list_start_y(theme);
        let visible_items = visible_rows(pixmap.height(), theme);
        let total_items = state.filtered_indices.len();
        let scroll_offset = state::scroll_offset(state.selected_index, total_items, visible_items);

        for (i, &entry_idx) in state.filtered_indices.iter().enumerate().skip(scroll_offset).take(visible_items) {
            let entry = &state.entries[entry_idx];
            let relative_index = i - scroll_offset;
            let y = list_start_y + (relative_index as f32 * ITEM_HEIGHT);

            let mut name_color = text_color;
            if i == state.selected_index {
                if let Some(sel_rect) = Rect::from_xywh(theme.padding / 2.0, y, width - theme.padding, ITEM_HEIGHT) {
                    self.draw_rounded_rect(pixmap, sel_rect, theme.border_radius / 2.0, sel_bg_color, None);
                }
                name_color = sel_text_color;
            }

            let mut text_x = theme.padding;
            if relative_index < 9 {
                let nr_text = format!("{}.", relative_index + 1);
                self.draw_text(pixmap, &nr_text, text_x, y + 6.0, 14.0, number_color, Weight::NORMAL);
            }
            text_x += 24.0;

            self.draw_text(pixmap, &entry.name, text_x, y + 4.0, NAME_SIZE, name_color, Weight::BOLD);
            self.draw_text(pixmap, &entry.exec, text_x, y + 8.0 + NAME_SIZE, EXEC_SIZE, exec_color, Weight::NORMAL);
        }

        if state.filtered_indices.is_empty() {
            let error_color = ThemeConfig::parse_color(&theme.error_color);
            let hint = if state.query.trim().is_empty() {
                "No results found".to_string()
            } else {
                format!("Return runs: {}", state.query.trim())
            };
            self.draw_text(pixmap, &hint, theme.padding, list_start_y, NAME_SIZE, error_color, Weight::NORMAL);
        }
    }

    fn draw_prompt(&mut self, pixmap: &mut PixmapMut, state: &AppState) {
        let Some((entry, input)) = state.prompt_entry() else { return; };
        let theme = &state.config.theme;
        let text_color = ThemeConfig::parse_color(&theme.text);
        let exec_color = ThemeConfig::parse_color(&theme.exec_text);
        let label_color = ThemeConfig::parse_color(&theme.label_color);
        let label = state.prompt_label().unwrap_or("Argument");

        let mut y = theme.padding;
        self.draw_text(pixmap, &entry.name, theme.padding, y, QUERY_SIZE, text_color, Weight::BOLD);
        y += QUERY_SIZE + theme.spacing;
        self.draw_text(pixmap, &entry.exec, theme.padding, y, EXEC_SIZE, exec_color, Weight::NORMAL);
        y += EXEC_SIZE + theme.spacing * 2.0;
        self.draw_text(pixmap, label, theme.padding, y, 14.0, label_color, Weight::NORMAL);
        y += 14.0 + theme.spacing;
        self.draw_text(pixmap, &format!("> {}_", input), theme.padding, y, NAME_SIZE, text_color, Weight::NORMAL);
    }

    fn draw_rounded_rect(&self, pixmap: &mut PixmapMut, rect: Rect, radius: f32, fill: Color, stroke: Option<Color>) {
        let mut pb = PathBuilder::new();
        let x = rect.left();
        let y = rect.top();
        let w = rect.width();
        let h = rect.height();

        pb.move_to(x + radius, y);
        pb.line_to(x + w - radius, y);
        pb.quad_to(x + w, y, x + w, y + radius);
        pb.line_to(x + w, y + h - radius);
        pb.quad_to(x + w, y + h, x + w - radius, y + h);
        pb.line_to(x + radius, y + h);
        pb.quad_to(x, y + h, x, y + h - radius);
        pb.line_to(x, y + radius);
        pb.quad_to(x, y, x + radius, y);
        pb.close();

        if let Some(path) = pb.finish() {
            let mut paint = Paint::default();
            paint.set_color(fill);
            paint.anti_alias = true;
            pixmap.fill_path(&path, &paint, tiny_skia::FillRule::Winding, Transform::identity(), None);

            if let Some(s_color) = stroke {
                let mut s_paint = Paint::default();
                s_paint.set_color(s_color);
                s_paint.anti_alias = true;
                let stroke_obj = Stroke { width: 1.5, ..Default::default() };
                pixmap.stroke_path(&path, &s_paint, &stroke_obj, Transform::identity(), None);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text(&mut self, pixmap: &mut PixmapMut, text: &str, x: f32, y: f32, size: f32, color: Color, weight: Weight) {
        let mut buffer = Buffer::new(&mut self.font_system, Metrics::new(size, size));
        buffer.set_size(&mut self.font_system, Some(pixmap.width() as f32 - x), None);
        buffer.set_text(&mut self.font_system, text, Attrs::new().weight(weight), cosmic_text::Shaping::Advanced);
        buffer.shape_until_scroll(&mut self.font_system, false);

        let text_color = cosmic_text::Color::rgba(
            (color.red() * 255.0) as u8,
            (color.green() * 255.0) as u8,
            (color.blue() * 255.0) as u8,
            (color.alpha() * 255.0) as u8,
        );

        buffer.draw(&mut self.font_system, &mut self.swash_cache, text_color, |draw_x, draw_y, w, h, color| {
            let draw_x = draw_x + x as i32;
            let draw_y = draw_y + y as i32;
            if w == 0 || h == 0 { return; }
            if draw_x >= 0 && draw_y >= 0 && draw_x < pixmap.width() as i32 && draw_y < pixmap.height() as i32 {
                let paint = Paint {
                    shader: tiny_skia::Shader::SolidColor(tiny_skia::Color::from_rgba8(color.r(), color.g(), color.b(), color.a())),
                    ..Paint::default()
                };
                if let Some(r) = Rect::from_xywh(draw_x as f32, draw_y as f32, w as f32, h as f32) {
                    pixmap.fill_rect(r, &paint, Transform::identity(), None);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_fit_below_query_line() {
        let theme = ThemeConfig::default();
        // 400 - (20 + 20 + 10) - 20 = 330 -> 7 rows of 44
        assert_eq!(visible_rows(400, &theme), 7);
        assert_eq!(visible_rows(10, &theme), 0);
    }
}
