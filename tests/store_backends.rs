use std::sync::Arc;

use tempfile::TempDir;

use shiori::model::{NewBook, NewChapter};
use shiori::store::{JsonStore, SqliteStore, StorageGateway};

fn chapter(book_id: Option<i64>, order: u32, title: &str) -> NewChapter {
    NewChapter {
        book_id,
        order,
        title: title.to_owned(),
        content: format!("<p>{title}</p>"),
        excerpt: title.to_owned(),
        site_name: "book.test".to_owned(),
        source_url: format!("https://book.test/{title}"),
        next_url: None,
    }
}

/// Behavioral contract both backends must satisfy.
async fn exercise_gateway(store: Arc<dyn StorageGateway>) {
    // Fresh store is empty.
    assert!(store.list_books().await.unwrap().is_empty());
    assert!(store.list_articles().await.unwrap().is_empty());
    assert!(store.get_book(1).await.unwrap().is_none());
    assert!(store.get_chapter(1).await.unwrap().is_none());

    let book = store
        .insert_book(NewBook {
            name: "Novel".to_owned(),
            site_name: "book.test".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(book.chapter_count, 0);

    assert_eq!(store.max_chapter_order(book.id).await.unwrap(), None);
    assert_eq!(store.count_chapters(book.id).await.unwrap(), 0);

    let c1 = store
        .insert_chapter(chapter(Some(book.id), 1, "one"))
        .await
        .unwrap();
    let c2 = store
        .insert_chapter(chapter(Some(book.id), 2, "two"))
        .await
        .unwrap();
    assert_ne!(c1.id, c2.id);

    assert_eq!(store.max_chapter_order(book.id).await.unwrap(), Some(2));
    assert_eq!(store.count_chapters(book.id).await.unwrap(), 2);

    let listed = store.list_chapters(book.id).await.unwrap();
    assert_eq!(
        listed.iter().map(|c| c.order).collect::<Vec<_>>(),
        vec![1, 2]
    );

    store.update_book_chapter_count(book.id, 2).await.unwrap();
    assert_eq!(
        store.get_book(book.id).await.unwrap().unwrap().chapter_count,
        2
    );
    assert!(store.update_book_chapter_count(9999, 1).await.is_err());

    // Standalone articles are chapters without a book, listed newest
    // first and invisible to the book's queries.
    let a1 = store.insert_chapter(chapter(None, 0, "article-a")).await.unwrap();
    let a2 = store.insert_chapter(chapter(None, 0, "article-b")).await.unwrap();
    let articles = store.list_articles().await.unwrap();
    assert_eq!(
        articles.iter().map(|a| a.id).collect::<Vec<_>>(),
        vec![a2.id, a1.id]
    );
    assert_eq!(store.count_chapters(book.id).await.unwrap(), 2);

    let fetched = store.get_chapter(c1.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "one");
    assert_eq!(fetched.book_id, Some(book.id));

    // Deleting one chapter leaves the rest intact.
    assert!(store.delete_chapter(c1.id).await.unwrap());
    assert!(!store.delete_chapter(c1.id).await.unwrap());
    assert_eq!(store.count_chapters(book.id).await.unwrap(), 1);

    // Deleting the book cascades its chapters but spares articles.
    assert!(store.delete_book(book.id).await.unwrap());
    assert!(!store.delete_book(book.id).await.unwrap());
    assert!(store.get_book(book.id).await.unwrap().is_none());
    assert!(store.get_chapter(c2.id).await.unwrap().is_none());
    assert_eq!(store.list_articles().await.unwrap().len(), 2);
}

#[tokio::test]
async fn json_backend_contract() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn StorageGateway> =
        Arc::new(JsonStore::new(tmp.path().join("articles.json")));
    exercise_gateway(store).await;
}

#[tokio::test]
async fn sqlite_backend_contract() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn StorageGateway> =
        Arc::new(SqliteStore::open(tmp.path().join("shiori.db")).unwrap());
    exercise_gateway(store).await;
}

#[tokio::test]
async fn json_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("articles.json");

    {
        let store = JsonStore::new(&path);
        let book = store
            .insert_book(NewBook {
                name: "Novel".to_owned(),
                site_name: "book.test".to_owned(),
            })
            .await
            .unwrap();
        store
            .insert_chapter(chapter(Some(book.id), 1, "one"))
            .await
            .unwrap();
    }

    let reopened = JsonStore::new(&path);
    let books = reopened.list_books().await.unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(reopened.count_chapters(books[0].id).await.unwrap(), 1);
}
