use crate::detection::ColorLabel;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Reads the class table, one `label,red,green,blue` line per class id.
pub fn load_color_labels(filepath: &Path) -> io::Result<Vec<ColorLabel>> {
    let file = File::open(filepath)?;
    parse_color_labels(io::BufReader::new(file))
}

pub fn parse_color_labels(reader: impl BufRead) -> io::Result<Vec<ColorLabel>> {
    let mut color_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();

        if parts.len() != 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }

        color_labels.push(ColorLabel {
            label: parts[0].trim().to_string(),
            red: parse_channel(parts[1], "red")?,
            green: parse_channel(parts[2], "green")?,
            blue: parse_channel(parts[3], "blue")?,
        });
    }

    Ok(color_labels)
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u8> {
    value.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value.trim()),
        )
    })
}
