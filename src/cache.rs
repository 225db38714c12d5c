// =============================================================================
// CROP CACHE
// =============================================================================
// Redis read-through cache for single-crop lookups (GET /crops/:id).
//
// Keys per crop:
// - crop:{id}      the crop document as JSON, tagged with the generation it
//                  was filled under, expiry: configured TTL
// - crop:{id}:gen  counter bumped by every write to the crop (and by delete)
//
// Redis failures are logged and treated as a miss; the catalog store is
// always the source of truth.
//
// NOTE: a fill races writes. A reader can miss, load the crop, and only then
// store it, while a write has already committed and invalidated in between.
// So a reader takes the generation *before* loading from the store, tags the
// document with it, and a lookup only serves a document whose tag equals the
// current generation. A late fill from before a write (or a delete) carries
// an old tag and reads back as a miss until the next fill replaces it.
// =============================================================================

use std::time::Instant;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics;
use crate::models::CropRecord;

/// How long a generation counter outlives its last write. Kept well above any
/// document TTL so a deleted crop's counter works as a tombstone.
const GENERATION_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct CropCache {
    /// `None` when no REDIS_URL is configured
    conn: Option<ConnectionManager>,
    ttl_secs: u64,
}

/// Result of a cache lookup.
#[derive(Debug, PartialEq)]
pub enum CacheLookup {
    Hit(CropRecord),
    /// `ticket` is the generation to tag a fill with. `None` means don't fill
    /// (cache disabled or Redis unreachable).
    Miss { ticket: Option<u64> },
}

/// What is stored under `crop:{id}`.
#[derive(Serialize, Deserialize)]
struct Tagged<C> {
    generation: u64,
    crop: C,
}

fn cache_key(crop_id: Uuid) -> String {
    format!("crop:{}", crop_id)
}

fn generation_key(crop_id: Uuid) -> String {
    format!("crop:{}:gen", crop_id)
}

/// Decide a lookup from the raw document and the current generation.
/// A missing counter is generation 0.
fn resolve(cached: Option<String>, generation: Option<u64>) -> CacheLookup {
    let generation = generation.unwrap_or(0);
    let current = cached
        .and_then(|json| serde_json::from_str::<Tagged<CropRecord>>(&json).ok())
        .filter(|tagged| tagged.generation == generation);

    match current {
        Some(tagged) => CacheLookup::Hit(tagged.crop),
        None => CacheLookup::Miss {
            ticket: Some(generation),
        },
    }
}

impl CropCache {
    /// Connect to Redis. `ConnectionManager` reconnects on its own after this.
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self {
            conn: Some(conn),
            ttl_secs,
        })
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            ttl_secs: 0,
        }
    }

    /// Read the document and the generation in one round trip.
    pub async fn get(&self, crop_id: Uuid) -> CacheLookup {
        let Some(mut conn) = self.conn.clone() else {
            return CacheLookup::Miss { ticket: None };
        };
        let start = Instant::now();

        let result: redis::RedisResult<(Option<String>, Option<u64>)> = redis::cmd("MGET")
            .arg(cache_key(crop_id))
            .arg(generation_key(crop_id))
            .query_async(&mut conn)
            .await;
        metrics::record_redis_operation("get", start.elapsed().as_secs_f64());

        match result {
            Ok((cached, generation)) => resolve(cached, generation),
            Err(err) => {
                tracing::warn!(crop_id = %crop_id, error = %err, "Crop cache read failed");
                CacheLookup::Miss { ticket: None }
            }
        }
    }

    /// Store a crop loaded after a miss, tagged with that miss's ticket.
    pub async fn put(&self, crop: &CropRecord, ticket: u64) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let tagged = Tagged {
            generation: ticket,
            crop,
        };
        let Ok(json) = serde_json::to_string(&tagged) else {
            return;
        };
        let start = Instant::now();

        let result: redis::RedisResult<()> = redis::cmd("SETEX")
            .arg(cache_key(crop.id))
            .arg(self.ttl_secs)
            .arg(json)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            tracing::warn!(crop_id = %crop.id, error = %err, "Crop cache write failed");
        }
        metrics::record_redis_operation("set", start.elapsed().as_secs_f64());
    }

    /// Call after every committed write to the crop, including delete.
    pub async fn invalidate(&self, crop_id: Uuid) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let start = Instant::now();

        // MULTI/EXEC: the bump and the delete land together.
        let result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(generation_key(crop_id))
            .ignore()
            .cmd("EXPIRE")
            .arg(generation_key(crop_id))
            .arg(GENERATION_TTL_SECS)
            .ignore()
            .cmd("DEL")
            .arg(cache_key(crop_id))
            .ignore()
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            tracing::warn!(crop_id = %crop_id, error = %err, "Crop cache invalidation failed");
        }
        metrics::record_redis_operation("invalidate", start.elapsed().as_secs_f64());
    }

    /// `None` when the cache is disabled, otherwise whether Redis answers PING.
    pub async fn ping(&self) -> Option<bool> {
        let mut conn = self.conn.clone()?;
        Some(
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewCrop, Owner};

    fn sample_crop() -> CropRecord {
        CropRecord::from_new(NewCrop {
            name: "Aman Rice".to_string(),
            image: String::new(),
            location: "Mymensingh".to_string(),
            price_per_unit: 55.0,
            quantity: 100,
            owner: Owner {
                owner_name: "Rahim".to_string(),
                owner_email: "rahim@farm.example".to_string(),
            },
        })
    }

    fn tagged_json(crop: &CropRecord, generation: u64) -> String {
        serde_json::to_string(&Tagged { generation, crop }).unwrap()
    }

    #[tokio::test]
    async fn disabled_cache_is_a_no_op() {
        let cache = CropCache::disabled();
        let crop = sample_crop();

        assert_eq!(cache.get(crop.id).await, CacheLookup::Miss { ticket: None });
        cache.put(&crop, 0).await;
        cache.invalidate(crop.id).await;
        assert_eq!(cache.ping().await, None);
    }

    #[test]
    fn keys_are_namespaced_by_crop() {
        let id = Uuid::new_v4();
        assert_eq!(cache_key(id), format!("crop:{}", id));
        assert_eq!(generation_key(id), format!("crop:{}:gen", id));
    }

    #[test]
    fn document_from_current_generation_is_a_hit() {
        let crop = sample_crop();
        assert_eq!(
            resolve(Some(tagged_json(&crop, 3)), Some(3)),
            CacheLookup::Hit(crop.clone())
        );
        // Never-written crop: no counter yet, fills are tagged 0.
        assert_eq!(
            resolve(Some(tagged_json(&crop, 0)), None),
            CacheLookup::Hit(crop)
        );
    }

    #[test]
    fn fill_that_lost_a_race_with_a_write_is_not_served() {
        // Reader misses at generation 4 and loads quantity 100; an acceptance
        // commits and invalidates (generation 5) before the reader stores.
        let stale = sample_crop();
        let ticket = match resolve(None, Some(4)) {
            CacheLookup::Miss { ticket } => ticket.unwrap(),
            hit => panic!("expected a miss, got {:?}", hit),
        };
        let late_fill = tagged_json(&stale, ticket);

        assert_eq!(
            resolve(Some(late_fill), Some(5)),
            CacheLookup::Miss { ticket: Some(5) }
        );
    }

    #[test]
    fn deleted_crop_does_not_come_back_from_a_late_fill() {
        let crop = sample_crop();
        // Delete bumped 0 -> 1 and the counter stays behind as a tombstone.
        assert_eq!(
            resolve(Some(tagged_json(&crop, 0)), Some(1)),
            CacheLookup::Miss { ticket: Some(1) }
        );
    }

    #[test]
    fn untagged_or_corrupt_documents_are_misses() {
        let crop = sample_crop();
        let bare = serde_json::to_string(&crop).unwrap();
        assert_eq!(resolve(Some(bare), None), CacheLookup::Miss { ticket: Some(0) });
        assert_eq!(
            resolve(Some("{not json".to_string()), Some(2)),
            CacheLookup::Miss { ticket: Some(2) }
        );
    }
}
