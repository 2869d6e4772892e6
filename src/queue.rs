//! Positional edits on a player queue.
//!
//! The device can only append to a queue and remove entries from it. Inserting
//! in the middle is done by removing the tail, appending the new entry and
//! appending the tail again, so every edit costs a handful of commands and
//! briefly changes what is queued.

use crate::channel::CommandChannel;
use crate::error::{HeosError, Result};
use crate::types::{AddToQueueType, MediaRef, PlayerId, QueueItem};
use std::sync::Arc;
use std::time::Duration;

/// A player queue plus the last listing read from the device
pub struct PlayQueue {
    channel: Arc<CommandChannel>,
    player_id: PlayerId,
    settle_delay: Duration,
    items: Vec<QueueItem>,
}

impl PlayQueue {
    pub fn new(channel: Arc<CommandChannel>, player_id: PlayerId, settle_delay: Duration) -> Self {
        Self {
            channel,
            player_id,
            settle_delay,
            items: Vec::new(),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Queue as of the last refresh or edit
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reload the queue from the device
    pub async fn refresh(&mut self) -> Result<&[QueueItem]> {
        self.items = self.channel.get_full_queue(self.player_id).await?;
        tracing::debug!("Queue of player {} has {} item(s)", self.player_id, self.items.len());
        Ok(&self.items)
    }

    /// Put `media` at `index`, shifting later entries back.
    ///
    /// Negative indices count from the end: `-1` appends.
    pub async fn insert(&mut self, index: isize, media: &MediaRef) -> Result<()> {
        self.refresh().await?;
        let position = insert_position(index, self.items.len())?;

        let tail = &self.items[position..];
        let tail_refs = tail
            .iter()
            .map(|item| {
                item.media_ref().ok_or_else(|| {
                    HeosError::InvalidResponse(format!(
                        "queue entry {} has no source or container id",
                        item.qid
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let tail_qids = tail.iter().map(|item| item.qid).collect::<Vec<_>>();

        tracing::debug!(
            "Inserting at position {} of {} ({} item(s) to move)",
            position,
            self.items.len(),
            tail_refs.len()
        );

        self.channel.remove_from_queue(self.player_id, &tail_qids).await?;

        // The tail goes back even when the new entry is rejected
        let added = self
            .channel
            .add_to_queue(self.player_id, media, AddToQueueType::AddToEnd)
            .await;
        let restored = self.append_all(&tail_refs).await;
        if let Err(e) = &added {
            tracing::warn!("Insert into queue of player {} failed: {}", self.player_id, e);
        }

        self.settle().await;
        let refreshed = self.refresh().await.map(|_| ());
        if refreshed.is_err() {
            self.items.clear();
        }
        added.and(restored).and(refreshed)
    }

    /// Append every entry of `media`, carrying on past failures.
    /// Returns the first error.
    async fn append_all(&self, media: &[MediaRef]) -> Result<()> {
        let mut first_error = None;
        for media in media {
            let added = self
                .channel
                .add_to_queue(self.player_id, media, AddToQueueType::AddToEnd)
                .await;
            if let Err(e) = added {
                tracing::warn!("Could not re-add {:?} to queue of player {}: {}", media, self.player_id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn append(&mut self, media: &MediaRef) -> Result<()> {
        self.channel
            .add_to_queue(self.player_id, media, AddToQueueType::AddToEnd)
            .await?;
        self.settle().await;
        self.refresh().await?;
        Ok(())
    }

    pub async fn prepend(&mut self, media: &MediaRef) -> Result<()> {
        self.insert(0, media).await
    }

    /// Remove the entry at `index`. Negative indices count from the end.
    pub async fn delete(&mut self, index: isize) -> Result<QueueItem> {
        self.refresh().await?;
        let position = existing_position(index, self.items.len())?;

        let qid = self.items[position].qid;
        self.channel.remove_from_queue(self.player_id, &[qid]).await?;

        let removed = self.items.remove(position);
        renumber(&mut self.items);
        Ok(removed)
    }

    /// Swap the entry at `index` for `media`
    pub async fn replace(&mut self, index: isize, media: &MediaRef) -> Result<()> {
        self.refresh().await?;
        let position = existing_position(index, self.items.len())?;

        self.delete(position as isize).await?;
        self.settle().await;
        self.insert(position as isize, media).await
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.channel.clear_queue(self.player_id).await?;
        self.items.clear();
        Ok(())
    }

    /// Start playing at queue entry `qid`, the first entry when `None`
    pub async fn play(&self, qid: Option<u32>) -> Result<()> {
        self.channel.play_queue(self.player_id, qid.unwrap_or(1)).await
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

/// Position for an insert into a queue of `len`; `len` itself appends
fn insert_position(index: isize, len: usize) -> Result<usize> {
    let resolved = if index < 0 {
        len as isize + index + 1
    } else {
        index
    };
    if resolved < 0 || resolved as usize > len {
        return Err(HeosError::InvalidArgument(format!(
            "insert index {} out of range for queue of {}",
            index, len
        )));
    }
    Ok(resolved as usize)
}

/// Position of an existing entry in a queue of `len`
fn existing_position(index: isize, len: usize) -> Result<usize> {
    let resolved = if index < 0 { len as isize + index } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(HeosError::InvalidArgument(format!(
            "index {} out of range for queue of {}",
            index, len
        )));
    }
    Ok(resolved as usize)
}

fn renumber(items: &mut [QueueItem]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.qid = i as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_position() {
        assert_eq!(insert_position(0, 3).unwrap(), 0);
        assert_eq!(insert_position(3, 3).unwrap(), 3);
        assert_eq!(insert_position(-1, 3).unwrap(), 3);
        assert_eq!(insert_position(-4, 3).unwrap(), 0);
        assert_eq!(insert_position(-1, 0).unwrap(), 0);
        assert!(matches!(insert_position(4, 3), Err(HeosError::InvalidArgument(_))));
        assert!(matches!(insert_position(-5, 3), Err(HeosError::InvalidArgument(_))));
    }

    #[test]
    fn test_existing_position() {
        assert_eq!(existing_position(0, 3).unwrap(), 0);
        assert_eq!(existing_position(-1, 3).unwrap(), 2);
        assert_eq!(existing_position(-3, 3).unwrap(), 0);
        assert!(existing_position(3, 3).is_err());
        assert!(existing_position(-4, 3).is_err());
        assert!(existing_position(0, 0).is_err());
    }

    #[test]
    fn test_renumber() {
        let mut items: Vec<QueueItem> = [2u32, 5, 9]
            .iter()
            .map(|qid| serde_json::from_value(serde_json::json!({ "qid": qid })).unwrap())
            .collect();
        renumber(&mut items);
        assert_eq!(items.iter().map(|i| i.qid).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
