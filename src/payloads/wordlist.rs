use std::collections::HashSet;
use std::fmt::{self, Debug, Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::typestate::{HasItems, HasName, NoItems, NoName, NotUnique, PayloadBuildState, Unique};
use super::{display_top, Named, Payload, PayloadGenerator, PayloadSource};
use crate::error::FuzzError;
use crate::std_ext::ops::Len;

/// generic container representing a wordlist
///
/// # Examples
///
/// ## Normal wordlist
///
/// items may repeat in a normal wordlist
///
/// ```
/// # use locfuzz::payloads::Wordlist;
/// # use locfuzz::Len;
/// let wordlist = Wordlist::new().word("1").word("2").name("words").build();
///
/// assert_eq!(wordlist.len(), 2);
/// ```
///
/// ## Unique wordlist
///
/// repeats are dropped, keeping the first occurrence of each word in place
///
/// ```
/// # use locfuzz::payloads::{PayloadGenerator, Wordlist};
/// # use locfuzz::Len;
/// let wordlist = Wordlist::new()
///    .words(["one", "two", "three", "one", "two", "three"])
///    .name("words")
///    .unique()
///    .build();
///
/// assert_eq!(wordlist.len(), 3);
/// assert_eq!(wordlist.items(), &["one", "two", "three"]);
/// ```
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wordlist {
    items: Vec<Payload>,
    source_name: String,
}

impl Wordlist {
    /// create a default (empty) `WordlistBuilder`
    ///
    /// # Note
    ///
    /// `WordlistBuilder::build` can only be called after `WordlistBuilder::name` and
    /// `WordlistBuilder::word` or `WordlistBuilder::words` have been called.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub const fn new() -> WordlistBuilder<NoItems, NoName, NotUnique> {
        WordlistBuilder {
            items: Vec::new(),
            source_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }

    /// given a collection of items, create a new `WordlistBuilder`
    ///
    /// # Examples
    ///
    /// ```
    /// # use locfuzz::payloads::Wordlist;
    /// let wordlist = Wordlist::with_words(["1", "2", "3"]).name("words").build();
    /// ```
    #[inline]
    pub fn with_words<I, T>(words: I) -> WordlistBuilder<HasItems, NoName, NotUnique>
    where
        Payload: From<T>,
        I: IntoIterator<Item = T>,
    {
        WordlistBuilder {
            items: words.into_iter().map(Payload::from).collect(),
            source_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }

    /// Populates a `Wordlist` with payloads out of the file with the path given by `file_path`
    ///
    /// empty lines and lines starting with `#` are skipped
    ///
    /// # Errors
    ///
    /// If the file can't be opened, [`FuzzError::PayloadFileOpenError`] is returned
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::fs;
    /// # use locfuzz::payloads::{PayloadGenerator, Wordlist};
    /// # use tempdir::TempDir;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let tmp_dir = TempDir::new("wordlist")?;
    /// let file_name = tmp_dir.path().join("smol-wordlist.txt");
    /// fs::write(&file_name, "one\ntwo\n\n\n#three\nfour\n")?;
    ///
    /// let wordlist = Wordlist::from_file(&file_name)?.name("words").build();
    ///
    /// assert_eq!(wordlist.items(), &["one", "two", "four"]);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all, level = "trace")]
    pub fn from_file<P>(file_path: P) -> Result<WordlistBuilder<HasItems, NoName, NotUnique>, FuzzError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(&file_path).map_err(|source| {
            error!(
                file = file_path.as_ref().to_string_lossy().to_string(),
                "could not open file while populating the wordlist: {}", source
            );

            FuzzError::PayloadFileOpenError {
                source,
                path: file_path.as_ref().to_string_lossy().to_string(),
            }
        })?;

        let reader = BufReader::new(file);

        let items = reader
            .lines()
            .map_while(Result::ok)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Payload::from)
            .collect();

        Ok(WordlistBuilder {
            items,
            source_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        })
    }

    /// Returns an iterator over the payloads in the wordlist.
    pub fn iter(&self) -> std::slice::Iter<'_, Payload> {
        self.items.iter()
    }
}

impl Display for Wordlist {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        display_top(f, "Wordlist", &self.items, 3)
    }
}

impl PayloadGenerator for Wordlist {
    fn get(&self, index: usize) -> Option<&Payload> {
        self.items.get(index)
    }

    #[inline]
    fn items(&self) -> &[Payload] {
        &self.items
    }
}

impl Named for Wordlist {
    #[inline]
    fn name(&self) -> &str {
        &self.source_name
    }
}

impl Len for Wordlist {
    #[inline]
    fn len(&self) -> usize {
        self.items.len()
    }
}

/// typestate builder for [`Wordlist`]
pub struct WordlistBuilder<ItemState, NameState, UniqueNess>
where
    ItemState: PayloadBuildState,
    NameState: PayloadBuildState,
    UniqueNess: PayloadBuildState,
{
    items: Vec<Payload>,
    source_name: Option<String>,
    _item_state: PhantomData<ItemState>,
    _name_state: PhantomData<NameState>,
    _unique_state: PhantomData<UniqueNess>,
}

impl<ItemState, UniqueNess> WordlistBuilder<ItemState, NoName, UniqueNess>
where
    ItemState: PayloadBuildState,
    UniqueNess: PayloadBuildState,
{
    /// name the wordlist
    pub fn name(self, source_name: &str) -> WordlistBuilder<ItemState, HasName, UniqueNess> {
        WordlistBuilder {
            items: self.items,
            source_name: Some(source_name.to_string()),
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }
}

impl<ItemState, NameState> WordlistBuilder<ItemState, NameState, NotUnique>
where
    ItemState: PayloadBuildState,
    NameState: PayloadBuildState,
{
    /// drop repeated words when building
    #[allow(clippy::missing_const_for_fn)]
    pub fn unique(self) -> WordlistBuilder<ItemState, NameState, Unique> {
        WordlistBuilder {
            items: self.items,
            source_name: self.source_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }
}

impl<ItemState, NameState, UniqueNess> WordlistBuilder<ItemState, NameState, UniqueNess>
where
    ItemState: PayloadBuildState,
    NameState: PayloadBuildState,
    UniqueNess: PayloadBuildState,
{
    /// append one word
    pub fn word<T>(mut self, word: T) -> WordlistBuilder<HasItems, NameState, UniqueNess>
    where
        Payload: From<T>,
    {
        self.items.push(word.into());

        WordlistBuilder {
            items: self.items,
            source_name: self.source_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }

    /// append several words
    pub fn words<I, T>(mut self, words: I) -> WordlistBuilder<HasItems, NameState, UniqueNess>
    where
        Payload: From<T>,
        I: IntoIterator<Item = T>,
    {
        self.items.extend(words.into_iter().map(Payload::from));

        WordlistBuilder {
            items: self.items,
            source_name: self.source_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
            _unique_state: PhantomData,
        }
    }
}

impl WordlistBuilder<HasItems, HasName, Unique> {
    /// finish the wordlist, dropping repeats
    pub fn build(self) -> PayloadSource {
        let mut seen = HashSet::with_capacity(self.items.len());

        let items = self
            .items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();

        PayloadSource::Wordlist(Wordlist {
            items,
            source_name: self.source_name.unwrap_or_default(),
        })
    }
}

impl WordlistBuilder<HasItems, HasName, NotUnique> {
    /// finish the wordlist
    pub fn build(self) -> PayloadSource {
        PayloadSource::Wordlist(Wordlist {
            items: self.items,
            source_name: self.source_name.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn wordlist_builder_with_both_word_methods() {
        let wordlist = Wordlist::new()
            .words(["one", "two", "three"])
            .word("four")
            .name("words")
            .build();

        assert_eq!(wordlist.len(), 4);
        assert_eq!(wordlist.items(), &["one", "two", "three", "four"]);
        assert_eq!(wordlist.name(), "words");
    }

    #[test]
    fn wordlist_builder_with_name_first() {
        let wordlist = Wordlist::new()
            .name("words")
            .words(["one", "two", "three"])
            .word("four")
            .build();

        assert_eq!(wordlist.len(), 4);
        assert_eq!(wordlist.get(3), Some(&Payload::from("four")));
        assert_eq!(wordlist.get(4), None);
    }

    #[test]
    fn unique_wordlist_keeps_first_occurrence_order() {
        let wordlist = Wordlist::with_words(["b", "a", "b", "c", "a"])
            .unique()
            .name("words")
            .build();

        assert_eq!(wordlist.items(), &["b", "a", "c"]);
    }

    #[test]
    fn from_file_reports_missing_files() -> Result<(), Box<dyn std::error::Error>> {
        let tmp_dir = TempDir::new("wordlist")?;
        let missing = tmp_dir.path().join("nope.txt");

        let result = Wordlist::from_file(&missing);

        assert!(matches!(result, Err(FuzzError::PayloadFileOpenError { .. })));
        Ok(())
    }

    #[test]
    fn wordlist_display_shows_top_entries() {
        let wordlist = Wordlist::with_words(["1", "2", "3", "4"]).name("words").build();

        assert_eq!(
            wordlist.to_string(),
            r#"Wordlist::{len=4, top-3=["1", "2", "3"]}"#
        );
    }
}
