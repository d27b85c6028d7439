//! End-to-end scenarios against the seeded music catalog: flat parameters
//! in, executed queries and committed mutation graphs out.

use paramql::logic::{
    parse_and_apply_mutation, parse_and_build_query, ApplyTarget, ParseOptions, QueryError,
};
use paramql::model::{RefSpec, RelLink};
use paramql::seed;
use paramql::store::Store;

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn album_ref(album_id: &str) -> RefSpec {
    RefSpec {
        keys: vec![("album_id".to_string(), album_id.to_string())],
    }
}

#[test]
fn filtered_sorted_paged_read() {
    let store = seed::demo_store();
    let plan = parse_and_build_query(
        "Album",
        &params(&[
            ("artist.name", "Aerosmith"),
            ("order_by", "year-DESC"),
            ("limit", "1"),
        ]),
        &ParseOptions::default(),
        &seed::demo_schema(),
        &seed::demo_whitelist(),
    )
    .unwrap();
    let rows = store.execute(&plan).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["title"], serde_json::json!("Big Ones"));
}

#[test]
fn complex_payload_reaches_the_same_rows_as_flat_keys() {
    let store = seed::demo_store();
    let schema = seed::demo_schema();
    let whitelist = seed::demo_whitelist();
    let opts = ParseOptions::default();

    let flat = parse_and_build_query(
        "Track",
        &params(&[("genre", "Rock"), ("milliseconds_lt", "250000")]),
        &opts,
        &schema,
        &whitelist,
    )
    .unwrap();
    let complex = parse_and_build_query(
        "Track",
        &params(&[(
            "query",
            r#"{"$and": [{"genre": "Rock"}, {"milliseconds": {"$lt": 250000}}]}"#,
        )]),
        &opts,
        &schema,
        &whitelist,
    )
    .unwrap();
    assert_eq!(
        store.execute(&flat).unwrap(),
        store.execute(&complex).unwrap()
    );
}

#[test]
fn page_cap_from_options_is_enforced() {
    let opts = ParseOptions {
        page_max_size: Some(10),
        ..Default::default()
    };
    let result = parse_and_build_query(
        "Track",
        &params(&[("limit", "50")]),
        &opts,
        &seed::demo_schema(),
        &seed::demo_whitelist(),
    );
    assert!(matches!(result, Err(QueryError::Parse(_))));
}

#[test]
fn create_album_with_new_tracks_and_commit() {
    let store = seed::demo_store();
    let schema = seed::demo_schema();
    let whitelist = seed::demo_whitelist();

    let outcome = parse_and_apply_mutation(
        ApplyTarget::Create("Album".to_string()),
        &params(&[
            ("album_id", "4"),
            ("title", "Get a Grip"),
            ("year", "1993"),
            ("artist.$id:artist_id=1.$set", "true"),
            ("tracks.$new0.title", "Cryin'"),
            ("tracks.$new0.milliseconds", "284000"),
            ("tracks.$new0.genre", "Rock"),
            ("tracks.$new0.$add", "true"),
            ("tracks.$new1.title", "Crazy"),
            ("tracks.$new1.milliseconds", "316000"),
            ("tracks.$new1.$add", "true"),
        ]),
        &schema,
        &whitelist,
        &store,
    )
    .unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    // The root album plus two new tracks.
    assert_eq!(outcome.graph.created.len(), 3);

    let receipt = store.commit(&outcome.graph).unwrap();
    assert_eq!(receipt.entity_count, 4);

    let plan = parse_and_build_query(
        "Album",
        &params(&[("tracks.title", "Crazy")]),
        &ParseOptions::default(),
        &schema,
        &whitelist,
    )
    .unwrap();
    let rows = store.execute(&plan).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields["title"], serde_json::json!("Get a Grip"));
}

#[test]
fn update_existing_album_through_its_tracks() {
    let store = seed::demo_store();
    let schema = seed::demo_schema();
    let whitelist = seed::demo_whitelist();

    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[
            ("year", "1995"),
            ("tracks.$id:track_id=1.genre", "Classic Rock"),
        ]),
        &schema,
        &whitelist,
        &store,
    )
    .unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    store.commit(&outcome.graph).unwrap();

    let track = store
        .lookup_by_key(
            "Track",
            &RefSpec {
                keys: vec![("track_id".to_string(), "1".to_string())],
            },
        )
        .unwrap()
        .unwrap();
    assert_eq!(track.fields["genre"], serde_json::json!("Classic Rock"));
    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    assert_eq!(album.fields["year"], serde_json::json!(1995));
}

#[test]
fn reference_miss_leaves_the_rest_of_the_request_intact() {
    let store = seed::demo_store();
    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[
            ("title", "Big Ones Remastered"),
            ("tracks.$id:track_id=999.$add", "true"),
        ]),
        &seed::demo_schema(),
        &seed::demo_whitelist(),
        &store,
    )
    .unwrap();
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors.get("tracks.$id:track_id=999").is_some());
    let root = outcome.graph.get(&outcome.root).unwrap();
    assert_eq!(
        root.fields["title"],
        serde_json::json!("Big Ones Remastered")
    );
    // Nothing was committed, so the store still holds the old title.
    let persisted = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    assert_eq!(persisted.fields["title"], serde_json::json!("Big Ones"));
}

#[test]
fn replace_a_to_one_link_with_set() {
    let store = seed::demo_store();
    let schema = seed::demo_schema();
    let whitelist = seed::demo_whitelist();

    let album = store.lookup_by_key("Album", &album_ref("2")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[("artist.$id:artist_id=1.$set", "true")]),
        &schema,
        &whitelist,
        &store,
    )
    .unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    store.commit(&outcome.graph).unwrap();

    let album = store.lookup_by_key("Album", &album_ref("2")).unwrap().unwrap();
    assert_eq!(
        album.relationships["artist"],
        RelLink::One(Some("artist-1".to_string()))
    );
}

#[test]
fn detach_a_track_with_remove() {
    let store = seed::demo_store();
    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[("tracks.$id:track_id=2.$remove", "true")]),
        &seed::demo_schema(),
        &seed::demo_whitelist(),
        &store,
    )
    .unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    store.commit(&outcome.graph).unwrap();

    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    assert_eq!(
        album.relationships["tracks"],
        RelLink::Many(vec!["track-1".to_string()])
    );
    // The detached track itself still exists.
    assert!(store
        .lookup_by_key(
            "Track",
            &RefSpec {
                keys: vec![("track_id".to_string(), "2".to_string())],
            },
        )
        .unwrap()
        .is_some());
}

#[test]
fn url_safe_aliases_work_end_to_end() {
    let store = seed::demo_store();
    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[
            ("tracks._new_0.title", "Rag Doll"),
            ("tracks._new_0.milliseconds", "264000"),
            ("tracks._new_0._add_", "true"),
        ]),
        &seed::demo_schema(),
        &seed::demo_whitelist(),
        &store,
    )
    .unwrap();
    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    assert_eq!(outcome.graph.created.len(), 1);
}

#[test]
fn denied_writes_are_reported_per_path() {
    let store = seed::demo_store();
    let whitelist = paramql::logic::WhitelistSet::compile(["title"]).unwrap();
    let album = store.lookup_by_key("Album", &album_ref("1")).unwrap().unwrap();
    let outcome = parse_and_apply_mutation(
        ApplyTarget::Existing(album),
        &params(&[("title", "Allowed"), ("year", "2001")]),
        &seed::demo_schema(),
        &whitelist,
        &store,
    )
    .unwrap();
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors.get("year").is_some());
    let root = outcome.graph.get(&outcome.root).unwrap();
    assert_eq!(root.fields["title"], serde_json::json!("Allowed"));
}
