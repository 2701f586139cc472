//! Command-line surface: argument parsing and command dispatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cache::{CacheStorage, Library};
use crate::deck::{parse_back, Side, StudySession};
use crate::seed::Dataset;
use crate::store::types::{Category, CategoryUpdate, Flashcard, NewCategory, NewFlashcard};
use crate::store::DocumentStore;
use crate::sync::{DeleteCategoryOutcome, SyncCoordinator};

#[derive(Parser, Debug)]
#[command(name = "flashsync")]
#[command(about = "Study categorized flashcards stored in Firestore")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flashsync/config.yaml)
  #[arg(long, global = true)]
  pub config: Option<PathBuf>,

  /// Don't read or write the local snapshot
  #[arg(long, global = true)]
  pub no_cache: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// List categories with their flashcard counts
  Categories,
  /// List flashcards, optionally for one category (id or name)
  Cards {
    #[arg(short, long)]
    category: Option<String>,
  },
  /// Study a category interactively
  Study {
    category: String,
    /// Keep the stored order instead of shuffling
    #[arg(long)]
    no_shuffle: bool,
  },
  AddCategory {
    name: String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long)]
    order: Option<i64>,
  },
  EditCategory {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    order: Option<i64>,
  },
  /// Delete a category that has no flashcards
  DeleteCategory { id: String },
  /// Rank categories in the given order
  Reorder {
    #[arg(required = true)]
    ids: Vec<String>,
  },
  AddCard {
    /// Category id or name
    #[arg(short, long)]
    category: String,
    #[arg(short, long)]
    front: String,
    /// Answer; "debit, credit" for a T-chart
    #[arg(short, long)]
    back: String,
    #[arg(long)]
    image: Option<String>,
  },
  EditCard {
    id: String,
    #[arg(short, long)]
    category: Option<String>,
    #[arg(short, long)]
    front: Option<String>,
    #[arg(short, long)]
    back: Option<String>,
    #[arg(long)]
    image: Option<String>,
  },
  DeleteCard { id: String },
  /// Import categories and flashcards from a YAML or JSON file
  Seed { file: PathBuf },
}

impl Command {
  /// Whether the command writes to the database (admin only).
  pub fn is_mutation(&self) -> bool {
    !matches!(
      self,
      Command::Categories | Command::Cards { .. } | Command::Study { .. }
    )
  }
}

/// Find a category by id, falling back to a case-insensitive name match.
pub fn resolve_category<'a>(library: &'a Library, key: &str) -> Result<&'a Category> {
  library
    .category(key)
    .or_else(|| {
      library
        .categories
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(key))
    })
    .ok_or_else(|| eyre!("Category '{}' not found", key))
}

pub async fn run<D: DocumentStore, S: CacheStorage>(
  sync: &SyncCoordinator<D, S>,
  command: Command,
) -> Result<()> {
  match command {
    Command::Categories => {
      let library = sync.load_data().await?;
      print_categories(&library);
    }
    Command::Cards { category } => {
      let library = sync.load_data().await?;
      let cards = match category {
        Some(key) => library.flashcards_in(&resolve_category(&library, &key)?.id),
        None => library.flashcards.clone(),
      };
      print_cards(&cards);
    }
    Command::Study {
      category,
      no_shuffle,
    } => {
      let library = sync.load_data().await?;
      let category = resolve_category(&library, &category)?;
      let cards = sync.flashcards_by_category(&category.id).await?;
      if cards.is_empty() {
        println!("'{}' has no flashcards yet.", category.name);
        return Ok(());
      }
      study(&category.name, cards, !no_shuffle).await?;
    }
    Command::AddCategory {
      name,
      description,
      order,
    } => {
      let id = sync
        .add_category(NewCategory {
          name,
          description,
          order,
        })
        .await?;
      println!("Created category {}", id);
    }
    Command::EditCategory {
      id,
      name,
      description,
      order,
    } => {
      sync
        .edit_category(
          &id,
          CategoryUpdate {
            name,
            description,
            order,
          },
        )
        .await?;
      println!("Updated category {}", id);
    }
    Command::DeleteCategory { id } => match sync.delete_category(&id).await? {
      DeleteCategoryOutcome::Deleted => println!("Deleted category {}", id),
      DeleteCategoryOutcome::Rejected(in_use) => println!("{}", in_use),
    },
    Command::Reorder { ids } => {
      sync.reorder_categories(&ids).await?;
      println!("Reordered {} categories", ids.len());
    }
    Command::AddCard {
      category,
      front,
      back,
      image,
    } => {
      let library = sync.load_data().await?;
      let category_id = resolve_category(&library, &category)?.id.clone();
      let card = sync
        .add_flashcard(NewFlashcard {
          category_id,
          front,
          back: parse_back(&back),
          img_src: image,
        })
        .await?;
      println!("Created flashcard {}", card.id);
    }
    Command::EditCard {
      id,
      category,
      front,
      back,
      image,
    } => {
      let library = sync.load_data().await?;
      let mut card = library
        .flashcard(&id)
        .cloned()
        .ok_or_else(|| eyre!("Flashcard {} not found", id))?;
      if let Some(key) = category {
        card.category_id = resolve_category(&library, &key)?.id.clone();
      }
      if let Some(front) = front {
        card.front = front;
      }
      if let Some(back) = back {
        card.back = parse_back(&back);
      }
      if image.is_some() {
        card.img_src = image;
      }
      sync.edit_flashcard(card).await?;
      println!("Updated flashcard {}", id);
    }
    Command::DeleteCard { id } => {
      sync.delete_flashcard(&id).await?;
      println!("Deleted flashcard {}", id);
    }
    Command::Seed { file } => {
      let dataset = Dataset::load(&file)?;
      let summary = sync.seed(&dataset).await?;
      println!(
        "Seeded {} categories with {} flashcards",
        summary.categories, summary.flashcards
      );
    }
  }
  Ok(())
}

fn print_categories(library: &Library) {
  if library.categories.is_empty() {
    println!("No categories.");
    return;
  }
  println!("{:<22} {:<28} {:>5}  DESCRIPTION", "ID", "NAME", "CARDS");
  for category in &library.categories {
    println!(
      "{:<22} {:<28} {:>5}  {}",
      category.id,
      category.name,
      library.usage_count(&category.id),
      category.description
    );
  }
}

fn print_cards(cards: &[Flashcard]) {
  if cards.is_empty() {
    println!("No flashcards.");
    return;
  }
  for card in cards {
    println!("{:<38} {}  =>  {}", card.id, card.front, card.back.join(" | "));
  }
}

const STUDY_HELP: &str = "[enter/n] next  [p] prev  [f] flip  [h] hint  [s] shuffle  [q] quit";

async fn study(name: &str, cards: Vec<Flashcard>, shuffle: bool) -> Result<()> {
  let mut rng = StdRng::from_entropy();
  let mut session = if shuffle {
    StudySession::shuffled(cards, &mut rng)
  } else {
    StudySession::new(cards)
  };

  println!("Studying '{}' ({} cards)", name, session.len());
  println!("{}", STUDY_HELP);
  show(&session);

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read input: {}", e))?
  {
    match line.trim() {
      "" | "n" => session.next(),
      "p" => session.prev(),
      "f" => session.flip(),
      "h" => {
        if let Some(hint) = session.hint() {
          println!("  hint: {}", hint);
        }
        continue;
      }
      "s" => session.reshuffle(&mut rng),
      "q" => break,
      _ => {
        println!("{}", STUDY_HELP);
        continue;
      }
    }
    show(&session);
  }
  Ok(())
}

fn show(session: &StudySession) {
  let Some(card) = session.current() else {
    return;
  };
  let position = format!("[{}/{}]", session.position() + 1, session.len());
  match session.side() {
    Side::Front => println!("{} {}", position, card.front),
    Side::Back if card.is_t_chart() => {
      println!("{} Debit: {}  |  Credit: {}", position, card.back[0], card.back[1])
    }
    Side::Back => println!("{} {}", position, card.back.join(", ")),
  }
  if let Some(img) = &card.img_src {
    println!("  image: {}", img);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use clap::CommandFactory;
  use crate::store::MemoryStore;

  fn parse(args: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("flashsync").chain(args.iter().copied())).unwrap()
  }

  #[test]
  fn test_parse_commands() {
    let args = parse(&["--no-cache", "study", "Assets", "--no-shuffle"]);
    assert!(args.no_cache);
    assert_eq!(
      args.command,
      Command::Study {
        category: "Assets".to_string(),
        no_shuffle: true
      }
    );

    let args = parse(&["add-card", "-c", "Entries", "-f", "Pay rent", "-b", "Rent Expense, Cash"]);
    assert!(args.command.is_mutation());
  }

  #[test]
  fn test_cli_definition_is_consistent() {
    Args::command().debug_assert();
  }

  #[test]
  fn test_category_short_flag_with_global_config() {
    let args = parse(&["--config", "alt.yaml", "cards", "-c", "Assets"]);
    assert_eq!(args.config, Some(PathBuf::from("alt.yaml")));
    assert_eq!(
      args.command,
      Command::Cards {
        category: Some("Assets".to_string())
      }
    );

    let args = parse(&["edit-card", "f1", "-c", "Expenses", "--config", "alt.yaml"]);
    assert!(args.config.is_some());
  }

  #[test]
  fn test_reorder_requires_ids() {
    assert!(Args::try_parse_from(["flashsync", "reorder"]).is_err());
  }

  #[test]
  fn test_reads_are_not_mutations() {
    assert!(!Command::Categories.is_mutation());
    assert!(!Command::Cards { category: None }.is_mutation());
    assert!(Command::DeleteCard { id: "x".to_string() }.is_mutation());
    assert!(Command::Seed { file: PathBuf::from("d.yaml") }.is_mutation());
  }

  #[tokio::test]
  async fn test_add_card_by_category_name() {
    let sync = SyncCoordinator::new(MemoryStore::new(), MemoryStorage::new(), "flashcards_data:test");
    run(
      &sync,
      Command::AddCategory {
        name: "Entries".to_string(),
        description: String::new(),
        order: None,
      },
    )
    .await
    .unwrap();
    run(
      &sync,
      Command::AddCard {
        category: "entries".to_string(),
        front: "Pay rent".to_string(),
        back: "Rent Expense, Cash".to_string(),
        image: None,
      },
    )
    .await
    .unwrap();

    let library = sync.load_data().await.unwrap();
    assert_eq!(library.flashcards.len(), 1);
    assert_eq!(library.flashcards[0].back, vec!["Rent Expense", "Cash"]);
    assert!(resolve_category(&library, "Missing").is_err());
  }
}
