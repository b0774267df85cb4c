//! Content store tests
//!
//! Covers library and manga resolution, metadata and cover persistence,
//! chapter layouts, the finished marker, and search across libraries.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use tokio::fs;

use hondana::prelude::*;
use hondana::types::{ChapterMeta, ChapterOverrides, Depth};

// Import test utilities from mod
mod common;
use common::{metadata, put_pages, temp_root};

#[cfg(test)]
mod store_tests {
    use super::*;

    async fn search_ids(library: &Library, keywords: &str) -> Vec<String> {
        library
            .search(keywords)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    async fn search_keys(manager: &LibraryManager, query: &SearchQuery) -> Vec<String> {
        manager
            .search(query)
            .await
            .unwrap()
            .iter()
            .map(|m| m.key())
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_list_libraries() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());

        assert!(manager.libraries().await.unwrap().is_empty());

        // a root that does not exist yet is just an empty store
        let missing = LibraryManager::new(root.path().join("not-there"));
        assert!(missing.libraries().await.unwrap().is_empty());

        let library = manager.create_library("mangadex").await.unwrap();
        assert_eq!(library.id(), "mangadex");
        assert!(library.path().is_dir());

        // creating again returns the same library
        manager.create_library("mangadex").await.unwrap();

        manager.create_library("lib-10").await.unwrap();
        manager.create_library("lib-2").await.unwrap();

        let ids: Vec<String> = manager
            .libraries()
            .await
            .unwrap()
            .iter()
            .map(|l| l.id().to_string())
            .collect();
        assert_eq!(ids, vec!["lib-2", "lib-10", "mangadex"]);

        assert!(manager.library("mangadex").await.is_ok());
        assert!(manager.library("kissmanga").await.unwrap_err().is_not_found());

        library.create_manga("m-10").await.unwrap();
        library.create_manga("m-2").await.unwrap();
        assert_eq!(library.manga_ids().await.unwrap(), vec!["m-2", "m-10"]);

        // cross-library resolution goes through the manager
        let manga = manager.manga("mangadex", "m-2").await.unwrap();
        assert_eq!(manga.key(), "mangadex/m-2");
        assert!(manager.manga("mangadex", "m-3").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_ids() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());

        for id in ["", ".", "..", "a/b", "a\\b"] {
            let err = manager.create_library(id).await.unwrap_err();
            assert!(matches!(err, Error::IllegalId(_)), "accepted {:?}", id);
        }
        // nothing may touch the disk on a rejected id
        assert!(manager.libraries().await.unwrap().is_empty());

        let library = manager.create_library("lib").await.unwrap();
        let err = library.create_manga("../escape").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));
        let err = library.manga("..").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));

        let manga = library.create_manga("manga").await.unwrap();
        let err = manga.create_chapter("", "..").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));
        let err = manga.create_chapter("..", "ch-1").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));
        // a collection id without a chapter id addresses nothing
        let err = manga.chapter("vol-1", "").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));

        let chapter = manga.create_chapter("", "ch-1").await.unwrap();
        let err = chapter.image("../x").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));
        let err = chapter.put_image("..", "png", b"x").await.unwrap_err();
        assert!(matches!(err, Error::IllegalId(_)));
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("berserk").await.unwrap();

        assert!(!manga.has_metadata().await.unwrap());
        assert!(manga.metadata().await.unwrap_err().is_not_found());

        let mut tags = BTreeMap::new();
        tags.insert(
            "genre".to_string(),
            vec!["Action".to_string(), "Drama".to_string()],
        );
        let doc = MangaMetadata {
            title: "Berserk".to_string(),
            authors: vec!["Kentarou Miura".to_string()],
            is_finished: true,
            description: "A dark fantasy epic.".to_string(),
            tags,
        };
        manga.set_metadata(&doc).await.unwrap();

        assert!(manga.has_metadata().await.unwrap());
        assert_eq!(manga.metadata().await.unwrap(), doc);

        // the on-disk document is camelCase
        let raw = fs::read_to_string(manga.path().join("metadata.json"))
            .await
            .unwrap();
        assert!(raw.contains("\"isFinished\""));
        assert!(!raw.contains("is_finished"));

        // the atomic write leaves no staging file behind
        assert!(!manga.path().join("metadata.json.part").exists());
    }

    #[tokio::test]
    async fn test_metadata_tolerates_foreign_documents() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("partial").await.unwrap();

        let raw = r#"{ "title": "Partial", "sourceUrl": "https://example.com", "rating": 4.5 }"#;
        fs::write(manga.path().join("metadata.json"), raw)
            .await
            .unwrap();

        let read = manga.metadata().await.unwrap();
        assert_eq!(read.title, "Partial");
        assert!(read.authors.is_empty());
        assert!(!read.is_finished);
        assert!(read.tags.is_empty());
    }

    #[tokio::test]
    async fn test_cover_selection_and_replacement() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("covers").await.unwrap();

        assert!(!manga.has_cover().await.unwrap());
        assert!(manga.cover().await.unwrap_err().is_not_found());

        let flat = manga.create_chapter("", "").await.unwrap();
        flat.put_image("b", "png", b"page-b").await.unwrap();
        flat.put_image("a", "jpg", b"page-a").await.unwrap();

        // without a dedicated cover file the first image serves
        let cover = manga.cover().await.unwrap();
        assert_eq!(cover.extension, "jpg");
        assert_eq!(&cover.bytes[..], b"page-a");

        // a file with the cover stem wins over the sort order
        flat.put_image("cover", "webp", b"the-cover").await.unwrap();
        let cover = manga.cover().await.unwrap();
        assert_eq!(cover.extension, "webp");
        assert_eq!(&cover.bytes[..], b"the-cover");

        manga.set_cover(".PNG", b"new-cover").await.unwrap();
        let cover = manga.cover().await.unwrap();
        assert_eq!(cover.extension, "png");
        assert_eq!(&cover.bytes[..], b"new-cover");
        assert!(manga.path().join("cover.png").exists());
        assert!(!manga.path().join("cover.webp").exists());
    }

    #[tokio::test]
    async fn test_chapter_marker_lifecycle() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        let chapter = manga.create_chapter("", "ch-1").await.unwrap();
        assert!(chapter.path().is_dir());
        assert!(chapter.path().join(".unfinished").is_file());
        assert!(!chapter.is_finished().await.unwrap());

        put_pages(&chapter, 3).await;
        chapter.mark_finished().await.unwrap();
        assert!(chapter.is_finished().await.unwrap());
        assert!(!chapter.path().join(".unfinished").exists());
        // removing the marker twice is fine
        chapter.mark_finished().await.unwrap();

        // re-creating an existing chapter keeps its state
        let again = manga.create_chapter("", "ch-1").await.unwrap();
        assert!(again.is_finished().await.unwrap());
        assert_eq!(again.image_ids().await.unwrap(), vec!["1", "2", "3"]);

        again.mark_unfinished().await.unwrap();
        again.mark_unfinished().await.unwrap();
        assert!(!chapter.is_finished().await.unwrap());
    }

    #[tokio::test]
    async fn test_chapter_addressing() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        let chapter = manga.create_chapter("vol-1", "ch-1").await.unwrap();
        assert_eq!(chapter.path(), manga.path().join("vol-1").join("ch-1"));
        assert_eq!(chapter.collection_id(), "vol-1");
        assert_eq!(chapter.id(), "ch-1");
        assert_eq!(chapter.depth(), Depth::TwoLevel);

        assert!(manga.chapter("vol-1", "ch-1").await.is_ok());
        assert!(manga.chapter("vol-1", "ch-2").await.unwrap_err().is_not_found());
        assert!(manga.chapter("", "ghost").await.unwrap_err().is_not_found());

        // the manga directory itself is the flat chapter
        let flat = manga.chapter("", "").await.unwrap();
        assert_eq!(flat.path(), manga.path());
        assert_eq!(flat.depth(), Depth::Flat);
    }

    #[tokio::test]
    async fn test_image_round_trip() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();
        let chapter = manga.create_chapter("", "ch-1").await.unwrap();

        chapter.put_image("1", "png", b"first").await.unwrap();
        chapter.put_image("10", "png", b"tenth").await.unwrap();
        chapter.put_image("2", "png", b"second").await.unwrap();
        // same id and extension overwrites
        chapter.put_image("2", "png", b"second-replaced").await.unwrap();

        assert_eq!(chapter.image_ids().await.unwrap(), vec!["1", "2", "10"]);

        let image = chapter.image("2").await.unwrap();
        assert_eq!(image.extension, "png");
        assert_eq!(&image.bytes[..], b"second-replaced");

        // a second extension under the same id does not duplicate the id
        chapter.put_image("2", "jpg", b"jpeg-version").await.unwrap();
        assert_eq!(chapter.image_ids().await.unwrap(), vec!["1", "2", "10"]);
        assert_eq!(chapter.image("2").await.unwrap().extension, "jpg");

        assert!(chapter.image("3").await.unwrap_err().is_not_found());
        // the marker never shows up as an image
        assert!(chapter.image(".unfinished").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_chapter_overrides_round_trip() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        assert!(manga.chapter_overrides().await.unwrap().is_none());

        let overrides = ChapterOverrides(vec![
            (
                "zeta".to_string(),
                vec![
                    (
                        "ch-2".to_string(),
                        ChapterMeta {
                            name: "Chapter 2".to_string(),
                            title: "The Brand".to_string(),
                        },
                    ),
                    ("ch-1".to_string(), ChapterMeta::default()),
                ],
            ),
            (
                "alpha".to_string(),
                vec![(
                    "ch-1".to_string(),
                    ChapterMeta {
                        name: "Intro".to_string(),
                        title: String::new(),
                    },
                )],
            ),
        ]);
        manga.set_chapter_overrides(&overrides).await.unwrap();
        assert!(manga.path().join("chapters.json").is_file());

        // document order survives the round trip, no alphabetical sorting
        let read = manga.chapter_overrides().await.unwrap().unwrap();
        assert_eq!(read, overrides);
        assert_eq!(read.0[0].0, "zeta");
        assert_eq!(read.0[1].0, "alpha");
        assert_eq!(read.0[0].1[0].0, "ch-2");
        assert_eq!(read.0[0].1[1].0, "ch-1");
    }

    #[tokio::test]
    async fn test_detail_prefers_overrides() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        let done = manga.create_chapter("vol-1", "ch-2").await.unwrap();
        put_pages(&done, 2).await;
        done.mark_finished().await.unwrap();

        // a directory the override document does not mention
        let stray = manga.create_chapter("vol-9", "ch-9").await.unwrap();
        put_pages(&stray, 1).await;

        let overrides = ChapterOverrides(vec![(
            "vol-1".to_string(),
            vec![
                (
                    "ch-2".to_string(),
                    ChapterMeta {
                        name: "Chapter 2".to_string(),
                        title: "The Brand".to_string(),
                    },
                ),
                ("ch-1".to_string(), ChapterMeta::default()),
                (
                    "..".to_string(),
                    ChapterMeta {
                        name: "bogus".to_string(),
                        title: String::new(),
                    },
                ),
            ],
        )]);
        manga.set_chapter_overrides(&overrides).await.unwrap();

        let detail = manga.detail().await.unwrap();
        println!("detail: {:?}", detail);

        assert!(detail.previews.is_empty());
        assert_eq!(detail.collections.len(), 1);

        let collection = &detail.collections[0];
        assert_eq!(collection.id, "vol-1");
        let ids: Vec<&str> = collection.chapters.iter().map(|c| c.id.as_str()).collect();
        // the unusable id is dropped, the rest keeps document order
        assert_eq!(ids, vec!["ch-2", "ch-1"]);

        assert_eq!(collection.chapters[0].name, "Chapter 2");
        assert_eq!(collection.chapters[0].title, "The Brand");
        assert!(collection.chapters[0].finished);

        // empty name falls back to the id; the directory does not exist yet
        assert_eq!(collection.chapters[1].name, "ch-1");
        assert!(!collection.chapters[1].finished);
    }

    #[tokio::test]
    async fn test_detail_two_level_layout() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        let finished = manga.create_chapter("vol-1", "ch-1").await.unwrap();
        put_pages(&finished, 2).await;
        finished.mark_finished().await.unwrap();

        let pending = manga.create_chapter("vol-2", "ch-1").await.unwrap();
        put_pages(&pending, 1).await;

        // collections without image-bearing chapters disappear
        fs::create_dir_all(manga.path().join("extras").join("notes"))
            .await
            .unwrap();

        let detail = manga.detail().await.unwrap();
        assert!(detail.previews.is_empty());
        assert_eq!(detail.collections.len(), 2);

        assert_eq!(detail.collections[0].id, "vol-1");
        assert_eq!(detail.collections[0].chapters.len(), 1);
        assert_eq!(detail.collections[0].chapters[0].collection_id, "vol-1");
        assert_eq!(detail.collections[0].chapters[0].id, "ch-1");
        assert!(detail.collections[0].chapters[0].finished);

        assert_eq!(detail.collections[1].id, "vol-2");
        assert!(!detail.collections[1].chapters[0].finished);
    }

    #[tokio::test]
    async fn test_detail_one_level_layout() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();
        let manga = library.create_manga("manga").await.unwrap();

        let ch1 = manga.create_chapter("", "ch-1").await.unwrap();
        put_pages(&ch1, 1).await;
        ch1.mark_finished().await.unwrap();

        let ch2 = manga.create_chapter("", "ch-2").await.unwrap();
        put_pages(&ch2, 1).await;

        // directories without images are not chapters
        fs::create_dir_all(manga.path().join("drafts")).await.unwrap();

        let detail = manga.detail().await.unwrap();
        assert!(detail.previews.is_empty());
        assert_eq!(detail.collections.len(), 1);
        assert_eq!(detail.collections[0].id, "");

        let ids: Vec<&str> = detail.collections[0]
            .chapters
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["ch-1", "ch-2"]);
        assert!(detail.collections[0].chapters[0].finished);
        assert!(!detail.collections[0].chapters[1].finished);
    }

    #[tokio::test]
    async fn test_detail_flat_previews_and_title() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();

        // a manga with nothing in it is a valid, empty detail
        let empty = library.create_manga("empty").await.unwrap();
        let detail = empty.detail().await.unwrap();
        assert!(detail.collections.is_empty());
        assert!(detail.previews.is_empty());
        assert_eq!(detail.title, "empty");

        let manga = library.create_manga("gallery").await.unwrap();
        let flat = manga.create_chapter("", "").await.unwrap();
        flat.put_image("10", "png", b"ten").await.unwrap();
        flat.put_image("2", "png", b"two").await.unwrap();
        flat.put_image("1", "png", b"one").await.unwrap();

        let detail = manga.detail().await.unwrap();
        assert!(detail.collections.is_empty());
        assert_eq!(detail.previews, vec!["1", "2", "10"]);
        // without metadata the id stands in for the title
        assert_eq!(detail.title, "gallery");
        assert!(detail.metadata.is_none());

        // a blank title is as good as no title
        manga.set_metadata(&metadata("   ", false)).await.unwrap();
        assert_eq!(manga.detail().await.unwrap().title, "gallery");

        manga
            .set_metadata(&metadata("Gallery of Ten", false))
            .await
            .unwrap();
        let detail = manga.detail().await.unwrap();
        assert_eq!(detail.title, "Gallery of Ten");
        assert!(detail.metadata.is_some());
        assert_eq!(detail.library_id, "lib");
        assert_eq!(detail.id, "gallery");
    }

    #[tokio::test]
    async fn test_library_search_filters() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();

        let mut tags = BTreeMap::new();
        tags.insert(
            "genre".to_string(),
            vec!["Action".to_string(), "Drama".to_string()],
        );
        let berserk = library.create_manga("berserk").await.unwrap();
        berserk
            .set_metadata(&MangaMetadata {
                title: "Berserk".to_string(),
                authors: vec!["Kentarou Miura".to_string()],
                tags,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut tags = BTreeMap::new();
        tags.insert(
            "genre".to_string(),
            vec!["Action".to_string(), "Adventure".to_string()],
        );
        let one_piece = library.create_manga("one-piece").await.unwrap();
        one_piece
            .set_metadata(&MangaMetadata {
                title: "One Piece".to_string(),
                authors: vec!["Eiichiro Oda".to_string()],
                tags,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut tags = BTreeMap::new();
        tags.insert("genre".to_string(), vec!["Comedy".to_string()]);
        let yotsuba = library.create_manga("yotsuba").await.unwrap();
        yotsuba
            .set_metadata(&MangaMetadata {
                title: "Yotsuba&!".to_string(),
                tags,
                ..Default::default()
            })
            .await
            .unwrap();

        // no metadata at all: the id itself is searchable
        library.create_manga("raw-scans").await.unwrap();

        assert_eq!(search_ids(&library, "").await.len(), 4);
        assert_eq!(
            search_ids(&library, "action").await,
            vec!["berserk", "one-piece"]
        );
        assert_eq!(search_ids(&library, "genre:comedy").await, vec!["yotsuba"]);
        assert_eq!(
            search_ids(&library, "-genre:action").await,
            vec!["raw-scans", "yotsuba"]
        );
        assert_eq!(
            search_ids(&library, "action; -adventure").await,
            vec!["berserk"]
        );
        assert_eq!(search_ids(&library, "oda").await, vec!["one-piece"]);
        assert_eq!(search_ids(&library, "raw").await, vec!["raw-scans"]);

        // exact inclusion keeps entries that do not carry the value
        assert_eq!(
            search_ids(&library, "Berserk$").await,
            vec!["one-piece", "raw-scans", "yotsuba"]
        );
        assert_eq!(search_ids(&library, "-Berserk$").await, vec!["berserk"]);
    }

    #[tokio::test]
    async fn test_manager_search_recency_and_cursor() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let lib_a = manager.create_library("lib-a").await.unwrap();
        let lib_b = manager.create_library("lib-b").await.unwrap();

        for (library, manga_id, title) in [
            (&lib_a, "alpha", "Alpha"),
            (&lib_b, "bravo", "Bravo"),
            (&lib_a, "charlie", "Charlie"),
            (&lib_b, "delta", "Delta"),
        ] {
            let manga = library.create_manga(manga_id).await.unwrap();
            manga.set_metadata(&metadata(title, false)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        // newest first, across libraries
        let keys = search_keys(&manager, &SearchQuery::from("")).await;
        println!("merged keys: {:?}", keys);
        assert_eq!(
            keys,
            vec!["lib-b/delta", "lib-a/charlie", "lib-b/bravo", "lib-a/alpha"]
        );

        // the cursor names the last key already seen
        let query = SearchQueryBuilder::default()
            .from_key("lib-a/charlie".to_string())
            .build()
            .unwrap();
        assert_eq!(
            search_keys(&manager, &query).await,
            vec!["lib-b/bravo", "lib-a/alpha"]
        );

        // an unknown cursor starts over from the top
        let query = SearchQueryBuilder::default()
            .from_key("lib-a/ghost".to_string())
            .build()
            .unwrap();
        assert_eq!(search_keys(&manager, &query).await.len(), 4);

        let query = SearchQueryBuilder::default()
            .limit(Some(2))
            .build()
            .unwrap();
        assert_eq!(
            search_keys(&manager, &query).await,
            vec!["lib-b/delta", "lib-a/charlie"]
        );

        // keywords filter the merged list
        let query = SearchQueryBuilder::default()
            .keywords("charlie")
            .build()
            .unwrap();
        assert_eq!(search_keys(&manager, &query).await, vec!["lib-a/charlie"]);
    }

    #[tokio::test]
    async fn test_random_manga() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());

        assert!(manager.random_manga().await.unwrap_err().is_not_found());

        let library = manager.create_library("lib").await.unwrap();
        assert!(manager.random_manga().await.unwrap_err().is_not_found());

        library.create_manga("solo").await.unwrap();
        assert_eq!(manager.random_manga().await.unwrap().key(), "lib/solo");

        library.create_manga("duo").await.unwrap();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            seen.insert(manager.random_manga().await.unwrap().key());
        }
        assert!(seen.contains("lib/solo"));
        assert!(seen.contains("lib/duo"));
    }

    #[tokio::test]
    async fn test_delete_manga() {
        let root = temp_root();
        let manager = LibraryManager::new(root.path());
        let library = manager.create_library("lib").await.unwrap();

        let manga = library.create_manga("doomed").await.unwrap();
        manga.set_metadata(&metadata("Doomed", false)).await.unwrap();
        let chapter = manga.create_chapter("vol-1", "ch-1").await.unwrap();
        put_pages(&chapter, 2).await;

        let path = manga.path().to_path_buf();
        assert!(path.is_dir());

        library.delete_manga("doomed").await.unwrap();
        assert!(!path.exists());
        assert!(library.manga("doomed").await.unwrap_err().is_not_found());
        assert!(library.delete_manga("doomed").await.unwrap_err().is_not_found());
    }
}
