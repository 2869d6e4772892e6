use crate::channel::CommandChannel;
use crate::error::{HeosError, Result};
use crate::protocol::Command;
use crate::types::{Player, PlayerId, QueueItem};

/// Most queue entries `player/get_queue` returns per request
pub const MAX_QUEUE_PAGE: usize = 100;

/// `player` command group, player listing and queue verbs
impl CommandChannel {
    /// Every player in the HEOS system
    pub async fn get_players(&self) -> Result<Vec<Player>> {
        self.call(Command::new("player", "get_players"))
            .await?
            .items()
    }

    pub async fn get_player_info(&self, player_id: PlayerId) -> Result<Player> {
        self.call(Command::new("player", "get_player_info").param("pid", player_id))
            .await?
            .record()
    }

    /// One page of the play queue, `count` items from zero-based `start`
    pub async fn get_queue(&self, player_id: PlayerId, start: usize, count: usize) -> Result<Vec<QueueItem>> {
        if !(1..=MAX_QUEUE_PAGE).contains(&count) {
            return Err(HeosError::InvalidArgument(format!(
                "queue page size must be between 1 and {}, got {}",
                MAX_QUEUE_PAGE, count
            )));
        }

        let result = self
            .call(
                Command::new("player", "get_queue")
                    .param("pid", player_id)
                    .param("range", format!("{},{}", start, start + count - 1)),
            )
            .await?;
        result.items()
    }

    /// The whole play queue
    pub async fn get_full_queue(&self, player_id: PlayerId) -> Result<Vec<QueueItem>> {
        let mut queue = Vec::new();
        loop {
            let page = self.get_queue(player_id, queue.len(), MAX_QUEUE_PAGE).await?;
            let done = page.len() < MAX_QUEUE_PAGE;
            queue.extend(page);
            if done {
                return Ok(queue);
            }
        }
    }

    /// Remove the entries at the given 1-based positions
    pub async fn remove_from_queue(&self, player_id: PlayerId, qids: &[u32]) -> Result<()> {
        if qids.is_empty() {
            return Ok(());
        }
        if qids.contains(&0) {
            return Err(HeosError::InvalidArgument("queue ids start at 1".to_string()));
        }

        let qids = qids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        self.call(
            Command::new("player", "remove_from_queue")
                .param("pid", player_id)
                .param("qid", qids),
        )
        .await?;
        Ok(())
    }

    pub async fn clear_queue(&self, player_id: PlayerId) -> Result<()> {
        self.call(Command::new("player", "clear_queue").param("pid", player_id))
            .await?;
        Ok(())
    }

    /// Start playback at queue entry `qid`
    pub async fn play_queue(&self, player_id: PlayerId, qid: u32) -> Result<()> {
        self.call(
            Command::new("player", "play_queue")
                .param("pid", player_id)
                .param("qid", qid),
        )
        .await?;
        Ok(())
    }
}
