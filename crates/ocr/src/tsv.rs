//! Tesseract TSV output
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Word rows have level 5 and are grouped
//! into lines by (block, paragraph, line).

use crate::Recognition;

const WORD_LEVEL: &str = "5";

/// Group word rows into lines; line confidence is the mean word confidence (0.0-1.0)
#[must_use]
pub fn parse_tsv(output: &str) -> Recognition {
    let mut lines: Vec<String> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();
    let mut current: Option<(String, String, String)> = None;
    let mut words: Vec<&str> = Vec::new();
    let mut word_confs: Vec<f32> = Vec::new();

    let mut flush = |words: &mut Vec<&str>, word_confs: &mut Vec<f32>| {
        if !words.is_empty() {
            lines.push(words.join(" "));
            let mean = if word_confs.is_empty() {
                0.0
            } else {
                word_confs.iter().sum::<f32>() / word_confs.len() as f32
            };
            confidences.push((mean / 100.0).clamp(0.0, 1.0));
        }
        words.clear();
        word_confs.clear();
    };

    for row in output.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != WORD_LEVEL {
            continue;
        }
        let text = cols[11].trim();
        let Ok(conf) = cols[10].trim().parse::<f32>() else {
            continue;
        };
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (cols[2].to_string(), cols[3].to_string(), cols[4].to_string());
        if current.as_ref() != Some(&key) {
            flush(&mut words, &mut word_confs);
            current = Some(key);
        }
        words.push(text);
        word_confs.push(conf);
    }
    flush(&mut words, &mut word_confs);

    Recognition {
        lines,
        confidences: Some(confidences),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
2\t1\t1\t0\t0\t0\t36\t92\t582\t92\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t582\t31\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t120\t31\t96.0\tHello
5\t1\t1\t1\t1\t2\t170\t92\t140\t31\t90.0\tworld
5\t1\t1\t1\t2\t1\t36\t140\t80\t31\t70.5\tSecond
5\t1\t1\t1\t2\t2\t120\t140\t60\t31\t-1\t
5\t1\t2\t1\t1\t1\t36\t300\t80\t31\t50\tthird
";

    #[test]
    fn test_words_grouped_into_lines() {
        let recognition = parse_tsv(SAMPLE);
        assert_eq!(recognition.lines, vec!["Hello world", "Second", "third"]);

        let confidences = recognition.confidences.unwrap();
        assert!((confidences[0] - 0.93).abs() < 1e-4);
        assert!((confidences[1] - 0.705).abs() < 1e-4);
        assert!((confidences[2] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_empty_output() {
        let recognition = parse_tsv("");
        assert!(recognition.lines.is_empty());
        assert_eq!(recognition.confidences, Some(Vec::new()));
    }
}
