//! Native "open" dialog.

use crate::normalize::{fix_separators, json_string_array, JsonEscaping};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Arguments of `ShowOpenDialog`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenDialogOptions {
    pub allow_multiple: bool,
    pub choose_directory: bool,
    pub title: String,
    /// Empty means "wherever the dialog opened last"
    pub initial_path: String,
    /// Space-delimited extensions without the leading dot; empty means all
    /// files
    pub file_types: String,
}

impl OpenDialogOptions {
    pub fn extensions(&self) -> Vec<&str> {
        self.file_types.split_whitespace().collect()
    }
}

/// What the user picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogSelection {
    Cancelled,
    Directory(PathBuf),
    /// Files as a directory plus names relative to it
    Files {
        directory: PathBuf,
        names: Vec<String>,
    },
}

impl DialogSelection {
    /// Group absolute file paths under the directory of the first one.
    pub fn from_files(paths: Vec<PathBuf>) -> Self {
        let Some(directory) = paths
            .first()
            .map(|first| first.parent().map(Path::to_path_buf).unwrap_or_default())
        else {
            return DialogSelection::Cancelled;
        };

        let names = paths
            .iter()
            .map(|path| {
                path.strip_prefix(&directory)
                    .unwrap_or(path)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        DialogSelection::Files { directory, names }
    }

    /// Absolute paths of the selection.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            DialogSelection::Cancelled => Vec::new(),
            DialogSelection::Directory(directory) => vec![directory.clone()],
            DialogSelection::Files { directory, names } => {
                names.iter().map(|name| directory.join(name)).collect()
            }
        }
    }

    /// JSON array of absolute paths, `[]` when cancelled.
    pub fn to_json(&self, escaping: JsonEscaping) -> String {
        let paths = self.paths();
        json_string_array(
            paths.iter().map(|path| path.to_string_lossy().into_owned()),
            escaping,
        )
    }
}

/// Presents file dialogs.
pub trait FileDialogs {
    /// Show an open dialog and block until the user closes it.
    fn pick(&self, options: &OpenDialogOptions) -> DialogSelection;
}

/// Native dialogs through `rfd`.
#[derive(Debug, Default)]
pub struct RfdDialogs;

impl FileDialogs for RfdDialogs {
    fn pick(&self, options: &OpenDialogOptions) -> DialogSelection {
        let mut dialog = rfd::FileDialog::new().set_title(options.title.as_str());
        if !options.initial_path.is_empty() {
            dialog = dialog.set_directory(fix_separators(&options.initial_path));
        }

        if options.choose_directory {
            return match dialog.pick_folder() {
                Some(directory) => DialogSelection::Directory(directory),
                None => DialogSelection::Cancelled,
            };
        }

        let extensions = options.extensions();
        if !extensions.is_empty() {
            dialog = dialog.add_filter("Files", extensions.as_slice());
        }

        let picked = if options.allow_multiple {
            dialog.pick_files().unwrap_or_default()
        } else {
            dialog.pick_file().into_iter().collect()
        };

        debug!(count = picked.len(), "Open dialog closed");
        DialogSelection::from_files(picked)
    }
}
