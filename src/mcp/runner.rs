//! Bounded worker pool with order-preserving results.
//!
//! `min(limit, items.len())` workers each pull the next un-started index
//! from a shared counter until the input is exhausted. No work stealing,
//! no priority. The output slice has the same length and order as the
//! input regardless of completion order. Each item runs in its own task,
//! so even a panicking processor is confined to its slot as an `Err`
//! instead of taking down the batch.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;

pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    process: F,
) -> Vec<Result<R, String>>
where
    T: Clone + Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(T, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = limit.max(1).min(total);
    let items = Arc::new(items);
    let process = Arc::new(process);
    let cursor = Arc::new(AtomicUsize::new(0));

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let items = items.clone();
        let process = process.clone();
        let cursor = cursor.clone();
        set.spawn(async move {
            let mut batch = Vec::new();
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                if index >= items.len() {
                    break;
                }
                let item = items[index].clone();
                let process = process.clone();
                // The item gets its own task: a panic inside the
                // processor surfaces as a JoinError for this index only.
                let result =
                    match tokio::spawn(async move { (process)(item, index).await }).await {
                        Ok(value) => Ok(value),
                        Err(e) => {
                            tracing::error!("item {index} failed: {e}");
                            Err(format!("worker task failed: {e}"))
                        }
                    };
                batch.push((index, result));
            }
            batch
        });
    }

    let mut slots: Vec<Option<Result<R, String>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(batch) => {
                for (index, value) in batch {
                    slots[index] = Some(value);
                }
            }
            Err(e) => tracing::error!("runner worker failed: {e}"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err("runner worker aborted before this item completed".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_input_spawns_nothing() {
        let results: Vec<Result<usize, String>> =
            run_bounded(Vec::<usize>::new(), 5, |item, _| async move { item }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_order_preserved_despite_completion_order() {
        // Earlier items sleep longer, so they complete last.
        let items: Vec<u64> = (0..8).collect();
        let results = run_bounded(items, 4, |item, index| async move {
            tokio::time::sleep(Duration::from_millis(40 - item * 5)).await;
            (index, item * 2)
        })
        .await;

        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            let (index, doubled) = result.as_ref().unwrap();
            assert_eq!(*index, i);
            assert_eq!(*doubled, i as u64 * 2);
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..12).collect();
        let (in_flight_ref, peak_ref) = (in_flight.clone(), peak.clone());
        run_bounded(items, 3, move |_, _| {
            let in_flight = in_flight_ref.clone();
            let peak = peak_ref.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_per_item_failure_stays_in_its_slot() {
        let items: Vec<usize> = (0..5).collect();
        let results = run_bounded(items, 5, |item, _| async move {
            if item == 2 {
                Err(format!("server {item} exploded"))
            } else {
                Ok(item)
            }
        })
        .await;

        assert_eq!(results.len(), 5);
        assert!(results[2].as_ref().unwrap().is_err());
        for (i, result) in results.iter().enumerate() {
            if i != 2 {
                assert_eq!(*result.as_ref().unwrap().as_ref().unwrap(), i);
            }
        }
    }

    #[tokio::test]
    async fn test_panicking_item_confined_to_its_slot() {
        let items: Vec<usize> = (0..5).collect();
        let results = run_bounded(items, 2, |item, _| async move {
            if item == 2 {
                panic!("processor bug for item {item}");
            }
            item * 10
        })
        .await;

        assert_eq!(results.len(), 5);
        assert!(results[2].is_err());
        for (i, result) in results.iter().enumerate() {
            if i != 2 {
                assert_eq!(*result.as_ref().unwrap(), i * 10);
            }
        }
    }

    #[tokio::test]
    async fn test_limit_larger_than_input() {
        let results = run_bounded(vec![1, 2], 16, |item, _| async move { item + 1 }).await;
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![2, 3]);
    }
}
