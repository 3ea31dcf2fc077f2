use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use zip::{ZipWriter, write::SimpleFileOptions};

use crate::{error::Result, render::Note, template::CardTemplate};

/// Note type shared by every note in a deck: field names, card templates, css.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteModel {
    pub model_id: i64,
    pub name: String,
    pub fields: Vec<String>,
    pub templates: Vec<CardTemplate>,
    pub css: String,
}

/// A named, accumulating collection of notes. Identity comes from external
/// configuration, never from derived state.
#[derive(Debug, Serialize, Deserialize)]
pub struct Deck {
    pub deck_id: i64,
    pub name: String,
    pub notes: Vec<Note>,
}

impl Deck {
    pub fn new(deck_id: i64, name: impl Into<String>) -> Self {
        Self {
            deck_id,
            name: name.into(),
            notes: Vec::new(),
        }
    }

    pub fn add_note(&mut self, note: Note) {
        self.notes.push(note);
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    model: &'a NoteModel,
    deck: &'a Deck,
}

/// The exportable bundle: a deck, its note model, and the media files its
/// notes reference. Written as a single zip with a `deck.json` manifest and a
/// `media/` directory.
pub struct Package {
    pub model: NoteModel,
    pub deck: Deck,
    pub media_files: Vec<PathBuf>,
}

impl Package {
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        zip.start_file("deck.json", options)?;
        let manifest = serde_json::to_string_pretty(&Manifest {
            model: &self.model,
            deck: &self.deck,
        })?;
        zip.write_all(manifest.as_bytes())?;

        for media in &self.media_files {
            let name = media
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            zip.start_file(format!("media/{name}"), options)?;
            zip.write_all(&std::fs::read(media)?)?;
        }

        zip.finish()?;
        Ok(())
    }
}
