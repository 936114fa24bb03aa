//! Page layout helpers shared by both artifacts

/// Placement of an image on a canvas, in points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Largest aspect-preserving size that fits the canvas, centered
#[must_use]
pub fn fit_centered(image_width: u32, image_height: u32, canvas_width: i64, canvas_height: i64) -> Placement {
    let (iw, ih) = (f64::from(image_width.max(1)), f64::from(image_height.max(1)));
    let (cw, ch) = (canvas_width.max(1) as f64, canvas_height.max(1) as f64);
    let scale = (cw / iw).min(ch / ih);

    // Clamped so rounding never pushes the image past the canvas edge
    let width = ((iw * scale).round() as i64).clamp(1, canvas_width.max(1));
    let height = ((ih * scale).round() as i64).clamp(1, canvas_height.max(1));

    Placement {
        x: (canvas_width - width) / 2,
        y: (canvas_height - height) / 2,
        width,
        height,
    }
}

/// Greedy word wrap at `columns` characters; words longer than a line are split
#[must_use]
pub fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut wrapped = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > columns {
            if current_len > 0 {
                wrapped.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(columns);
            wrapped.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > columns {
            wrapped.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }

    if current_len > 0 || wrapped.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

/// Wrap every line of a page's text
#[must_use]
pub fn wrap_text(lines: &[String], columns: usize) -> Vec<String> {
    lines.iter().flat_map(|line| wrap_line(line, columns)).collect()
}

/// WinAnsi bytes for a text line; anything outside printable Latin-1 becomes `?`
#[must_use]
pub fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
