//! Demo music-catalog schema, whitelist, and data set. Backs the binary's
//! demo mode and the test suites.

use crate::logic::whitelist::WhitelistSet;
use crate::model::{
    Cardinality, DataType, Entity, EntityDef, FieldDef, RelLink, RelationshipDef, Schema,
};
use crate::store::MemoryStore;
use serde_json::Value;
use std::collections::HashMap;

pub fn demo_schema() -> Schema {
    Schema {
        entities: vec![
            EntityDef {
                name: "Artist".to_string(),
                fields: vec![
                    field("artist_id", DataType::Integer, true),
                    field("name", DataType::String, false),
                    field("birth_year", DataType::Integer, false),
                ],
                relationships: vec![],
            },
            EntityDef {
                name: "Album".to_string(),
                fields: vec![
                    field("album_id", DataType::Integer, true),
                    field("title", DataType::String, false),
                    field("year", DataType::Integer, false),
                ],
                relationships: vec![
                    rel("artist", "Artist", Cardinality::ToOne),
                    rel("tracks", "Track", Cardinality::ToMany),
                ],
            },
            EntityDef {
                name: "Track".to_string(),
                fields: vec![
                    field("track_id", DataType::Integer, true),
                    field("title", DataType::String, false),
                    field("milliseconds", DataType::Integer, false),
                    field("genre", DataType::String, false),
                ],
                relationships: vec![],
            },
            EntityDef {
                name: "Playlist".to_string(),
                fields: vec![
                    field("playlist_id", DataType::Integer, true),
                    field("name", DataType::String, false),
                ],
                relationships: vec![rel("tracks", "Track", Cardinality::ToMany)],
            },
        ],
    }
}

/// Grants for the demo catalog: everything readable and writable, new
/// tracks creatable under albums and playlists.
pub fn demo_whitelist() -> WhitelistSet {
    WhitelistSet::compile([
        "artist_id",
        "name",
        "birth_year",
        "album_id",
        "title",
        "year",
        "track_id",
        "milliseconds",
        "genre",
        "playlist_id",
        "artist",
        "artist.artist_id",
        "artist.name",
        "artist.birth_year",
        "tracks",
        "tracks.track_id",
        "tracks.title",
        "tracks.milliseconds",
        "tracks.genre",
        "tracks.$new.title",
        "tracks.$new.milliseconds",
        "tracks.$new.genre",
    ])
    .expect("demo whitelist rules are valid")
}

pub fn demo_store() -> MemoryStore {
    let store = MemoryStore::new(demo_schema());

    store.insert(entity(
        "artist-1",
        "Artist",
        &[
            ("artist_id", Value::from(1)),
            ("name", Value::from("Aerosmith")),
            ("birth_year", Value::from(1970)),
        ],
        &[],
    ));
    store.insert(entity(
        "artist-2",
        "Artist",
        &[
            ("artist_id", Value::from(2)),
            ("name", Value::from("John Coltrane")),
            ("birth_year", Value::from(1926)),
        ],
        &[],
    ));

    store.insert(entity(
        "track-1",
        "Track",
        &[
            ("track_id", Value::from(1)),
            ("title", Value::from("Walk This Way")),
            ("milliseconds", Value::from(213_000)),
            ("genre", Value::from("Rock")),
        ],
        &[],
    ));
    store.insert(entity(
        "track-2",
        "Track",
        &[
            ("track_id", Value::from(2)),
            ("title", Value::from("Sweet Emotion")),
            ("milliseconds", Value::from(294_000)),
            ("genre", Value::from("Rock")),
        ],
        &[],
    ));
    store.insert(entity(
        "track-3",
        "Track",
        &[
            ("track_id", Value::from(3)),
            ("title", Value::from("Blue Train")),
            ("milliseconds", Value::from(643_000)),
            ("genre", Value::from("Jazz")),
        ],
        &[],
    ));
    store.insert(entity(
        "track-4",
        "Track",
        &[
            ("track_id", Value::from(4)),
            ("title", Value::from("Uncle Salty")),
            ("milliseconds", Value::from(246_000)),
            ("genre", Value::from("Rock")),
        ],
        &[],
    ));

    store.insert(entity(
        "album-1",
        "Album",
        &[
            ("album_id", Value::from(1)),
            ("title", Value::from("Big Ones")),
            ("year", Value::from(1994)),
        ],
        &[
            ("artist", RelLink::One(Some("artist-1".to_string()))),
            (
                "tracks",
                RelLink::Many(vec!["track-1".to_string(), "track-2".to_string()]),
            ),
        ],
    ));
    store.insert(entity(
        "album-2",
        "Album",
        &[
            ("album_id", Value::from(2)),
            ("title", Value::from("Blue Train")),
            ("year", Value::from(1958)),
        ],
        &[
            ("artist", RelLink::One(Some("artist-2".to_string()))),
            ("tracks", RelLink::Many(vec!["track-3".to_string()])),
        ],
    ));
    store.insert(entity(
        "album-3",
        "Album",
        &[
            ("album_id", Value::from(3)),
            ("title", Value::from("Toys in the Attic")),
            ("year", Value::from(1975)),
        ],
        &[
            ("artist", RelLink::One(Some("artist-1".to_string()))),
            ("tracks", RelLink::Many(vec!["track-4".to_string()])),
        ],
    ));

    store.insert(entity(
        "playlist-1",
        "Playlist",
        &[
            ("playlist_id", Value::from(1)),
            ("name", Value::from("Morning Drive")),
        ],
        &[(
            "tracks",
            RelLink::Many(vec!["track-1".to_string(), "track-3".to_string()]),
        )],
    ));

    store
}

fn field(name: &str, data_type: DataType, primary_key: bool) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        data_type,
        primary_key,
    }
}

fn rel(name: &str, target: &str, cardinality: Cardinality) -> RelationshipDef {
    RelationshipDef {
        name: name.to_string(),
        target: target.to_string(),
        cardinality,
    }
}

fn entity(
    id: &str,
    entity_type: &str,
    fields: &[(&str, Value)],
    relationships: &[(&str, RelLink)],
) -> Entity {
    Entity {
        id: id.to_string(),
        entity_type: entity_type.to_string(),
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>(),
        relationships: relationships
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}
