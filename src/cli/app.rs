//! CLI module for the notekeeper application
//!
//! This module bootstraps the notebook (migration, then load) and maps each
//! command onto the notebook service.
use std::{fs::read_to_string, path::PathBuf, sync::Arc};

use chrono::DateTime;
use log::{info, warn};

use crate::{
    parse_names, run_backup_check, BackupManager, Category, Commands, DocumentKind,
    FixedPathChooser, Migrator, NoEditor, Note, NotebookContext, NotebookError,
    NotebookScheduler, NotebookService, Result, SortSpec, SortTarget, UniqueDocument,
};

/// CLI Application handler - processes CLI commands and interfaces with NotebookService
pub struct App {
    context: NotebookContext,
    service: Arc<NotebookService>,
    backups: BackupManager,
}

impl App {
    /// Opens the notebook at `root_dir`, migrating it if needed, and loads
    /// every document. Fails if the migration does.
    pub fn bootstrap(root_dir: PathBuf) -> Result<Self> {
        let context = NotebookContext::open(root_dir)?;
        let service = Arc::new(NotebookService::open(&context));
        let backups = BackupManager::new(&context);

        if !Migrator::new(&context, &service, &backups).migrate() {
            return Err(NotebookError::MigrationFailed {
                message: "notebook is unavailable until the migration succeeds".to_string(),
            });
        }
        service.load_documents()?;

        Ok(Self {
            context,
            service,
            backups,
        })
    }

    pub fn service(&self) -> &Arc<NotebookService> {
        &self.service
    }

    /// Run the CLI application with the given command, then save everything.
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::NewNote {
                name,
                body,
                file,
                categories,
            } => self.create_note(name, body, file, categories)?,

            Commands::NewCategory { name, description } => {
                self.create_category(name, description)?
            }

            Commands::List {
                filter,
                search,
                categories,
                json,
            } => {
                if categories {
                    self.list_categories(json)?
                } else {
                    self.list_notes(filter, search.unwrap_or_default(), json)?
                }
            }

            Commands::Show { id, json } => self.show_note(id, json)?,

            Commands::Edit {
                id,
                name,
                body,
                file,
            } => self.edit_note(id, name, body, file)?,

            Commands::Tag {
                note_id,
                category_id,
            } => {
                let mut note = self.require_note(note_id)?;
                let category = self.require_category(category_id)?;
                if note.add_category(&category) {
                    self.service.save_note(&note)?;
                    println!("Filed note {} under '{}'", note_id, category.name());
                } else {
                    println!("Note {} is already filed under '{}'", note_id, category.name());
                }
            }

            Commands::Untag {
                note_id,
                category_id,
            } => {
                let mut note = self.require_note(note_id)?;
                let category = self.require_category(category_id)?;
                if note.remove_category(&category) {
                    self.service.save_note(&note)?;
                    println!("Removed '{}' from note {}", category.name(), note_id);
                } else {
                    println!("Note {} is not filed under '{}'", note_id, category.name());
                }
            }

            Commands::DeleteNote { id } => {
                let note = self.require_note(id)?;
                self.service.delete_note(&note)?;
                println!("Note {} deleted", id);
            }

            Commands::DeleteCategory { id } => {
                let category = self.require_category(id)?;
                self.service.delete_category(&category)?;
                println!("Category {} deleted", id);
            }

            Commands::Select { id } => {
                let category = self.require_category(id)?;
                self.service.select_one_category(&category)?;
                println!("Only '{}' is selected", category.name());
            }

            Commands::ToggleCategory { id } => {
                let category = self.require_category(id)?;
                let selected = self.service.toggle_category_selection(&category)?;
                println!(
                    "'{}' is now {}",
                    category.name(),
                    if selected { "selected" } else { "deselected" }
                );
            }

            Commands::ToggleNoCategory { enabled } => {
                let current = self
                    .context
                    .config()
                    .read(|c| c.is_no_category_selected)?;
                let value = enabled.unwrap_or(!current);
                self.service.set_no_category_selected(value)?;
                println!(
                    "Uncategorized notes are now {}",
                    if value { "shown" } else { "hidden" }
                );
            }

            Commands::Sort {
                target,
                key,
                direction,
            } => {
                let spec = SortSpec::new(key, direction);
                match target {
                    SortTarget::Notes => self.service.sort_notes(spec)?,
                    SortTarget::Categories => self.service.sort_categories(spec)?,
                }
                println!("Sorting {:?} by {}", target, spec);
            }

            Commands::ExportCsv => {
                let export = self.service.export_notes_csv()?;
                println!("{}", export.message);
            }

            Commands::Backup { output } => {
                let use_configured = output.is_none();
                let chooser = FixedPathChooser::new(output);
                match self.service.create_backup(&chooser, use_configured)? {
                    Some(path) => println!("Backup written to {}", path.display()),
                    None => println!("No backup written: pass --output or set AutomaticExportPath"),
                }
            }

            Commands::Restore { backup_file } => {
                match self.service.import_backup(&backup_file)? {
                    Some(summary) => println!(
                        "Restored {} notes and {} categories from {}",
                        summary.notes_restored,
                        summary.categories_restored,
                        summary.backup_file.display()
                    ),
                    None => println!("Another import is in progress"),
                }
            }

            Commands::Snapshot => match run_backup_check(&self.service, &self.backups, true)? {
                Some(path) => println!("Snapshot created at {}", path.display()),
                None => println!("Snapshot failed, see the log for details"),
            },

            Commands::Run => return self.run_scheduler().await,
        }

        self.service.save_full_notebook()?;
        Ok(())
    }

    async fn run_scheduler(&self) -> Result<()> {
        let mut scheduler = NotebookScheduler::new(
            Arc::clone(&self.service),
            self.backups.clone(),
            Arc::new(NoEditor),
        );
        scheduler.start().await?;
        println!("Notebook scheduler running. Press Ctrl-C to stop.");

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
        }

        info!("Interrupt received, shutting down");
        scheduler.shutdown().await?;
        Ok(())
    }

    fn require_note(&self, id: i64) -> Result<Note> {
        self.service
            .find_note(id)?
            .ok_or(NotebookError::DocumentNotFound {
                kind: DocumentKind::Note,
                id,
            })
    }

    fn require_category(&self, id: i64) -> Result<Category> {
        self.service
            .find_category(id)?
            .ok_or(NotebookError::DocumentNotFound {
                kind: DocumentKind::Category,
                id,
            })
    }

    fn read_body(body: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
        match (body, file) {
            (Some(text), _) => Ok(Some(text)),
            (_, Some(path)) => Ok(Some(read_to_string(path)?)),
            (None, None) => Ok(None),
        }
    }

    fn create_note(
        &self,
        name: Option<String>,
        body: Option<String>,
        file: Option<PathBuf>,
        categories: Option<String>,
    ) -> Result<()> {
        let body = Self::read_body(body, file)?;
        let mut note = self.service.create_note()?;

        if let Some(name) = name {
            note.set_name(&name);
        }
        if let Some(body) = body {
            note.set_body(&body);
        }

        let known = self.service.categories()?;
        for wanted in parse_names(categories) {
            match known.iter().find(|c| c.name() == wanted) {
                Some(category) => {
                    note.add_category(category);
                }
                None => warn!("No category named '{}', skipping", wanted),
            }
        }

        self.service.save_note(&note)?;
        println!("Note created with ID: {}", note.id());
        Ok(())
    }

    fn create_category(&self, name: Option<String>, description: Option<String>) -> Result<()> {
        let mut category = self.service.create_category()?;
        if let Some(name) = name {
            category.set_name(&name);
        }
        if let Some(description) = description {
            category.set_body(&description);
        }

        self.service.save_category(&category)?;
        println!("Category created with ID: {}", category.id());
        Ok(())
    }

    fn edit_note(
        &self,
        id: i64,
        name: Option<String>,
        body: Option<String>,
        file: Option<PathBuf>,
    ) -> Result<()> {
        let mut note = self.require_note(id)?;
        if let Some(name) = name {
            note.set_name(&name);
        }
        if let Some(body) = Self::read_body(body, file)? {
            note.set_body(&body);
        }

        self.service.save_note(&note)?;
        println!("Note {} updated", id);
        Ok(())
    }

    fn list_notes(&self, filter: bool, search: String, json: bool) -> Result<()> {
        let notes: Vec<Note> = self
            .service
            .get_notes(filter, &search)?
            .into_iter()
            .filter(|n| n.is_visible())
            .collect();

        if json {
            let simplified: Vec<serde_json::Value> = notes
                .iter()
                .map(|note| {
                    serde_json::json!({
                        "id": note.id(),
                        "name": note.name(),
                        "created": note.created(),
                        "modified": note.modified(),
                        "categories": note.category_names(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&simplified)?);
            return Ok(());
        }

        if notes.is_empty() {
            println!("No notes found matching the criteria.");
            return Ok(());
        }

        for note in &notes {
            let categories = if note.categories.is_empty() {
                String::new()
            } else {
                format!("  [{}]", note.category_names().join(", "))
            };
            println!(
                "{:>5}  {}  {}{}",
                note.id(),
                format_timestamp(note.modified()),
                note.name(),
                categories
            );
        }

        println!(
            "\nFound {} note{}",
            notes.len(),
            if notes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }

    fn list_categories(&self, json: bool) -> Result<()> {
        let categories = self.service.categories()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&categories)?);
            return Ok(());
        }

        let show_uncategorized = self
            .context
            .config()
            .read(|c| c.is_no_category_selected)?;
        for category in &categories {
            println!(
                "{:>5}  [{}]  {}",
                category.id(),
                if category.is_selected { "x" } else { " " },
                category.name()
            );
        }
        println!(
            "       [{}]  (no category)",
            if show_uncategorized { "x" } else { " " }
        );
        Ok(())
    }

    fn show_note(&self, id: i64, json: bool) -> Result<()> {
        let note = self.require_note(id)?;

        if json {
            let view = serde_json::json!({
                "id": note.id(),
                "name": note.name(),
                "internal_name": note.internal_name(),
                "body": note.body(),
                "created": note.created(),
                "modified": note.modified(),
                "categories": note.category_names(),
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
            return Ok(());
        }

        println!(
            "ID: {} | Created: {} | Modified: {}",
            note.id(),
            format_timestamp(note.created()),
            format_timestamp(note.modified())
        );
        println!("Name: {}", note.name());
        if !note.categories.is_empty() {
            println!("Categories: {}", note.category_names().join(", "));
        }
        if !note.body().is_empty() {
            println!("\n{}", note.body());
        }
        Ok(())
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}
