//! Study deck over a category's flashcards: shuffle, navigate, flip, hint.

use rand::Rng;

use crate::store::types::Flashcard;

/// Fisher-Yates shuffle into a new vector.
///
/// Lists with zero or one card come back unchanged.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
  let mut shuffled = items.to_vec();
  for i in (1..shuffled.len()).rev() {
    let j = rng.gen_range(0..=i);
    shuffled.swap(i, j);
  }
  shuffled
}

/// Split comma-separated answer input into back entries.
///
/// `"Rent Expense, Cash"` becomes `["Rent Expense", "Cash"]`; blank parts are dropped.
pub fn parse_back(input: &str) -> Vec<String> {
  input
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}

/// First letter of the answer, or `"D , C"` for a debit/credit pair.
pub fn hint(card: &Flashcard) -> String {
  let first = |s: &String| s.chars().next().map(String::from).unwrap_or_default();
  match card.back.as_slice() {
    [debit, credit, ..] => format!("{} , {}", first(debit), first(credit)),
    [answer] => first(answer),
    [] => String::new(),
  }
}

/// Which side of the current card is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Front,
  Back,
}

/// A pass through one set of cards.
#[derive(Debug, Clone)]
pub struct StudySession {
  cards: Vec<Flashcard>,
  index: usize,
  side: Side,
}

impl StudySession {
  /// Start at the first card, front side up, in the given order.
  pub fn new(cards: Vec<Flashcard>) -> Self {
    Self {
      cards,
      index: 0,
      side: Side::Front,
    }
  }

  /// Start with the cards shuffled.
  pub fn shuffled<R: Rng + ?Sized>(cards: Vec<Flashcard>, rng: &mut R) -> Self {
    Self::new(shuffle(&cards, rng))
  }

  pub fn len(&self) -> usize {
    self.cards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cards.is_empty()
  }

  /// Zero-based position of the current card.
  pub fn position(&self) -> usize {
    self.index
  }

  pub fn side(&self) -> Side {
    self.side
  }

  pub fn current(&self) -> Option<&Flashcard> {
    self.cards.get(self.index)
  }

  /// Advance, wrapping from the last card to the first.
  pub fn next(&mut self) {
    if !self.cards.is_empty() {
      self.index = (self.index + 1) % self.cards.len();
    }
    self.side = Side::Front;
  }

  /// Go back, wrapping from the first card to the last.
  pub fn prev(&mut self) {
    if !self.cards.is_empty() {
      self.index = (self.index + self.cards.len() - 1) % self.cards.len();
    }
    self.side = Side::Front;
  }

  pub fn flip(&mut self) {
    self.side = match self.side {
      Side::Front => Side::Back,
      Side::Back => Side::Front,
    };
  }

  /// Reshuffle and restart from the first card.
  pub fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
    self.cards = shuffle(&self.cards, rng);
    self.index = 0;
    self.side = Side::Front;
  }

  pub fn hint(&self) -> Option<String> {
    self.current().map(hint)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  fn card(id: &str, back: &[&str]) -> Flashcard {
    Flashcard {
      id: id.to_string(),
      category_id: "cat".to_string(),
      front: format!("front {}", id),
      back: back.iter().map(|s| s.to_string()).collect(),
      img_src: None,
    }
  }

  fn deck(n: usize) -> Vec<Flashcard> {
    (0..n).map(|i| card(&i.to_string(), &["Asset"])).collect()
  }

  #[test]
  fn test_shuffle_is_a_permutation() {
    let cards = deck(25);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..10 {
      let shuffled = shuffle(&cards, &mut rng);
      assert_eq!(shuffled.len(), cards.len());

      let mut ids: Vec<_> = shuffled.iter().map(|c| c.id.clone()).collect();
      let mut expected: Vec<_> = cards.iter().map(|c| c.id.clone()).collect();
      ids.sort();
      expected.sort();
      assert_eq!(ids, expected);
    }
  }

  #[test]
  fn test_shuffle_eventually_reorders() {
    let cards = deck(10);
    let mut rng = StdRng::seed_from_u64(42);
    let moved = (0..20).any(|_| shuffle(&cards, &mut rng) != cards);
    assert!(moved);
  }

  #[test]
  fn test_shuffle_small_inputs_unchanged() {
    let mut rng = StdRng::seed_from_u64(1);
    assert!(shuffle::<Flashcard, _>(&[], &mut rng).is_empty());
    let one = deck(1);
    assert_eq!(shuffle(&one, &mut rng), one);
  }

  #[test]
  fn test_navigation_wraps_and_resets_side() {
    let mut session = StudySession::new(deck(3));
    session.prev();
    assert_eq!(session.position(), 2);

    session.flip();
    assert_eq!(session.side(), Side::Back);
    session.next();
    assert_eq!(session.position(), 0);
    assert_eq!(session.side(), Side::Front);
  }

  #[test]
  fn test_empty_session_navigation_is_safe() {
    let mut session = StudySession::new(Vec::new());
    session.next();
    session.prev();
    assert!(session.current().is_none());
    assert!(session.hint().is_none());
  }

  #[test]
  fn test_reshuffle_restarts() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut session = StudySession::shuffled(deck(5), &mut rng);
    session.next();
    session.flip();
    session.reshuffle(&mut rng);
    assert_eq!(session.position(), 0);
    assert_eq!(session.side(), Side::Front);
    assert_eq!(session.len(), 5);
  }

  #[test]
  fn test_hints() {
    assert_eq!(hint(&card("1", &["Asset"])), "A");
    assert_eq!(hint(&card("2", &["Rent Expense", "Cash"])), "R , C");
  }

  #[test]
  fn test_parse_back() {
    assert_eq!(parse_back("Rent Expense, Cash"), vec!["Rent Expense", "Cash"]);
    assert_eq!(parse_back(" Asset ,, "), vec!["Asset"]);
    assert!(parse_back("  ").is_empty());
  }
}
