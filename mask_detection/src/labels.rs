use image::Rgb;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

pub const DEFAULT_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    pub short_name: String,
    pub color: Rgb<u8>,
}

/// Display name and overlay colour per detector class.
///
/// Classes missing from the table keep their full name and get [`DEFAULT_COLOR`].
#[derive(Debug, Clone)]
pub struct LabelTable {
    styles: HashMap<String, LabelStyle>,
    default_color: Rgb<u8>,
}

impl LabelTable {
    pub fn new(default_color: Rgb<u8>) -> Self {
        Self {
            styles: HashMap::new(),
            default_color,
        }
    }

    pub fn insert(
        &mut self,
        class_name: impl Into<String>,
        short_name: impl Into<String>,
        color: Rgb<u8>,
    ) {
        self.styles.insert(
            class_name.into(),
            LabelStyle {
                short_name: short_name.into(),
                color,
            },
        );
    }

    pub fn short_name<'a>(&'a self, class_name: &'a str) -> &'a str {
        self.styles
            .get(class_name)
            .map(|style| style.short_name.as_str())
            .unwrap_or(class_name)
    }

    pub fn color(&self, class_name: &str) -> Rgb<u8> {
        self.styles
            .get(class_name)
            .map(|style| style.color)
            .unwrap_or(self.default_color)
    }

    pub fn from_file(filepath: &Path) -> io::Result<Self> {
        let file = File::open(filepath)?;
        Self::from_reader(io::BufReader::new(file))
    }

    /// Parses `class,short name,red,green,blue` lines. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn from_reader(reader: impl BufRead) -> io::Result<Self> {
        let mut table = Self::new(DEFAULT_COLOR);

        for line_result in reader.lines() {
            let line = line_result?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() != 5 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid line format: {}", line),
                ));
            }

            let red = parse_channel(parts[2], "red")?;
            let green = parse_channel(parts[3], "green")?;
            let blue = parse_channel(parts[4], "blue")?;

            table.insert(parts[0], parts[1], Rgb([red, green, blue]));
        }

        Ok(table)
    }
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u8> {
    value.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value),
        )
    })
}

impl Default for LabelTable {
    fn default() -> Self {
        let mut table = Self::new(DEFAULT_COLOR);
        table.insert("with_mask", "mask", Rgb([0, 180, 0]));
        table.insert("without_mask", "no mask", Rgb([220, 0, 0]));
        table.insert("mask_weared_incorrect", "incorrect", Rgb([255, 140, 0]));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_default_table_abbreviates_known_classes() {
        let table = LabelTable::default();
        assert_eq!(table.short_name("mask_weared_incorrect"), "incorrect");
        assert_eq!(table.short_name("without_mask"), "no mask");
        assert_eq!(table.color("with_mask"), Rgb([0, 180, 0]));
    }

    #[test]
    fn test_unknown_class_falls_back() {
        let table = LabelTable::default();
        assert_eq!(table.short_name("helmet"), "helmet");
        assert_eq!(table.color("helmet"), DEFAULT_COLOR);
    }

    #[test]
    fn test_from_reader_adds_new_classes() {
        let csv = "# class,short,r,g,b\nhelmet, hat, 1, 2, 3\n\nwith_mask,mask,0,180,0\n";
        let table = LabelTable::from_reader(Cursor::new(csv)).unwrap();

        assert_eq!(table.styles.len(), 2);
        assert_eq!(table.short_name("helmet"), "hat");
        assert_eq!(table.color("helmet"), Rgb([1, 2, 3]));
    }

    #[test]
    fn test_from_reader_rejects_malformed_lines() {
        let missing_column = LabelTable::from_reader(Cursor::new("helmet,hat,1,2\n"));
        assert_eq!(missing_column.unwrap_err().kind(), io::ErrorKind::InvalidData);

        let out_of_range = LabelTable::from_reader(Cursor::new("helmet,hat,1,2,300\n"));
        assert_eq!(out_of_range.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
