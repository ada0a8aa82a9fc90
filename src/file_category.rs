//! Extension-based file classification.
//!
//! A [`CategoryTable`] maps category names to sets of lowercase extensions
//! (with their leading dot) and category names to destination subfolders.
//! Categories keep the order they were declared in, so an extension listed
//! under two categories resolves to the first one.
//!
//! # Examples
//!
//! ```
//! use tidywatch::file_category::{CategoryTable, OTHERS};
//!
//! let table = CategoryTable::standard();
//! assert_eq!(table.classify("holiday.JPG"), "Images");
//! assert_eq!(table.classify("notes.unknownext"), OTHERS);
//! assert_eq!(table.subfolder_for("Images"), "Images");
//! ```
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Reserved category for files whose extension matches no rule.
pub const OTHERS: &str = "Others";

/// A single category and the extensions that belong to it.
#[derive(Debug, Clone)]
struct CategoryRule {
    name: String,
    extensions: HashSet<String>,
}

/// Ordered category → extensions table plus category → subfolder mapping.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
    subfolders: HashMap<String, String>,
}

impl CategoryTable {
    /// Builds a table from the `file_types` and `folder_paths` sections of
    /// the configuration document.
    ///
    /// Extensions are lowercased and a leading dot is added when missing,
    /// so `"JPG"`, `"jpg"` and `".jpg"` all describe the same extension.
    pub fn new(
        file_types: &IndexMap<String, Vec<String>>,
        folder_paths: &IndexMap<String, String>,
    ) -> Self {
        let rules = file_types
            .iter()
            .map(|(name, extensions)| CategoryRule {
                name: name.clone(),
                extensions: extensions.iter().map(|ext| normalize_extension(ext)).collect(),
            })
            .collect();

        let subfolders = folder_paths
            .iter()
            .map(|(category, folder)| (category.clone(), folder.clone()))
            .collect();

        Self { rules, subfolders }
    }

    /// The built-in table used when the configuration omits `file_types`.
    pub fn standard() -> Self {
        let file_types = standard_file_types();
        let folder_paths = standard_folder_paths();
        Self::new(&file_types, &folder_paths)
    }

    /// Returns the category for a file name.
    ///
    /// The extension is the text after the last `.`, compared
    /// case-insensitively. Names without an extension, and extensions not
    /// present in any category, map to [`OTHERS`].
    pub fn classify(&self, filename: &str) -> &str {
        let Some(ext) = extension_of(filename) else {
            return OTHERS;
        };

        self.rules
            .iter()
            .find(|rule| rule.extensions.contains(&ext))
            .map(|rule| rule.name.as_str())
            .unwrap_or(OTHERS)
    }

    /// Returns the destination subfolder name for a category.
    ///
    /// Categories without a configured subfolder go to `Others`.
    pub fn subfolder_for(&self, category: &str) -> &str {
        self.subfolders
            .get(category)
            .map(String::as_str)
            .unwrap_or(OTHERS)
    }

    /// Category names in declaration order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.name.as_str())
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Lowercase extension of `filename` including the leading dot.
///
/// Returns `None` when the name has no `.` after its first character, so
/// dotfiles such as `.bashrc` have no extension.
fn extension_of(filename: &str) -> Option<String> {
    let idx = filename.rfind('.')?;
    if idx == 0 {
        return None;
    }
    Some(filename[idx..].to_lowercase())
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

pub(crate) fn standard_file_types() -> IndexMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 8] = [
        (
            "Images",
            &[".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp", ".tiff", ".ico", ".heic"],
        ),
        ("Audio", &[".mp3", ".wav", ".ogg", ".flac", ".aac", ".m4a", ".wma"]),
        (
            "Videos",
            &[".mp4", ".mkv", ".avi", ".mov", ".flv", ".wmv", ".webm", ".3gp"],
        ),
        (
            "Documents",
            &[".pdf", ".txt", ".doc", ".docx", ".md", ".rtf", ".odt"],
        ),
        ("Spreadsheets", &[".csv", ".xls", ".xlsx", ".ods"]),
        ("Presentations", &[".ppt", ".pptx", ".odp"]),
        (
            "Archives",
            &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz"],
        ),
        ("Installers", &[".exe", ".msi", ".dmg", ".pkg", ".deb", ".rpm"]),
    ];

    table
        .iter()
        .map(|(name, exts)| {
            (
                name.to_string(),
                exts.iter().map(|ext| ext.to_string()).collect(),
            )
        })
        .collect()
}

pub(crate) fn standard_folder_paths() -> IndexMap<String, String> {
    standard_file_types()
        .keys()
        .map(|name| (name.clone(), name.clone()))
        .chain(std::iter::once((OTHERS.to_string(), OTHERS.to_string())))
        .collect()
}
