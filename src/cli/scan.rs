use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::sanitize::{Category, DetectionPipeline, MappingTable, Sanitizer};

/// Scan a file, a directory, or stdin. Returns the number of values found.
///
/// Findings are reported by line and category; the values themselves are
/// never printed.
pub fn run(path: Option<&Path>, config_path: Option<&Path>) -> Result<usize> {
    let config = GatewayConfig::load(config_path)?;
    let pipeline = DetectionPipeline::from_config(&config.detection)?;
    let sanitizer = Sanitizer::new(std::sync::Arc::new(pipeline));
    let mut totals: BTreeMap<Category, u32> = BTreeMap::new();

    match path {
        Some(path) if path.is_dir() => {
            eprintln!("maskgate: scanning directory {}...", path.display());
            scan_dir(&sanitizer, path, &mut totals)?;
        }
        Some(path) if path.is_file() => {
            eprintln!("maskgate: scanning file {}...", path.display());
            scan_file(&sanitizer, path, &mut totals)?;
        }
        Some(path) => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path not found: {}", path.display()),
            )
            .into());
        }
        None => {
            let mut contents = String::new();
            std::io::stdin().read_to_string(&mut contents)?;
            scan_text(&sanitizer, "<stdin>", &contents, &mut totals);
        }
    }

    let total: u32 = totals.values().sum();
    if total > 0 {
        let summary: Vec<String> = totals.iter().map(|(c, n)| format!("{c}: {n}")).collect();
        eprintln!(
            "\nmaskgate: {} value(s) would be masked ({})",
            total,
            summary.join(", ")
        );
    } else {
        eprintln!("maskgate: scan clean -- nothing to mask.");
    }
    Ok(total as usize)
}

/// Report each line that contains something to mask.
fn scan_text(sanitizer: &Sanitizer, label: &str, contents: &str, totals: &mut BTreeMap<Category, u32>) {
    for (line_num, line) in contents.lines().enumerate() {
        let mut table = MappingTable::new();
        sanitizer.sanitize_text(line, &mut table);
        if table.is_empty() {
            continue;
        }
        let counts = table.category_counts();
        let categories: Vec<&str> = counts.keys().map(Category::as_str).collect();
        eprintln!("  {}:{}: {}", label, line_num + 1, categories.join(", "));
        for (category, n) in counts {
            *totals.entry(category).or_default() += n;
        }
    }
}

fn scan_file(sanitizer: &Sanitizer, path: &Path, totals: &mut BTreeMap<Category, u32>) -> Result<()> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Ok(()), // Skip binary/unreadable files
    };
    scan_text(sanitizer, &path.to_string_lossy(), &contents, totals);
    Ok(())
}

/// Scan a directory recursively, skipping hidden entries.
fn scan_dir(sanitizer: &Sanitizer, dir: &Path, totals: &mut BTreeMap<Category, u32>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'))
        {
            continue;
        }
        if path.is_dir() {
            scan_dir(sanitizer, &path, totals)?;
        } else if path.is_file() {
            scan_file(sanitizer, &path, totals)?;
        }
    }
    Ok(())
}
