use crate::channel::CommandChannel;
use crate::error::{HeosError, Result};
use crate::paging::{fetch_all, ItemRange, Page};
use crate::protocol::{Command, HeosResult};
use crate::types::{AddToQueueType, BrowseItem, MediaRef, MusicSource, PlayerId, SourceId};

/// Longest search string the device accepts
pub const MAX_SEARCH_LENGTH: usize = 128;

fn page_of(result: HeosResult) -> Result<Page<BrowseItem>> {
    let total = match result.var("count") {
        Some(count) => count.trim().parse().map_err(|_| {
            HeosError::InvalidResponse(format!("bad count '{}' in {}", count, result.header.command))
        })?,
        None => 0,
    };
    Ok(Page {
        items: result.items()?,
        total,
    })
}

/// `browse` command group
impl CommandChannel {
    pub async fn get_music_sources(&self) -> Result<Vec<MusicSource>> {
        self.call(Command::new("browse", "get_music_sources"))
            .await?
            .items()
    }

    /// Every item of a source, or of a container within it
    pub async fn browse_source(&self, source_id: SourceId, container_id: Option<&str>) -> Result<Vec<BrowseItem>> {
        fetch_all(|range: Option<ItemRange>| {
            let command = Command::new("browse", "browse")
                .param("sid", source_id)
                .param_opt("cid", container_id)
                .param_opt("range", range);
            async move { page_of(self.call(command).await?) }
        })
        .await
    }

    /// Every search hit for `query` under search criteria `criteria_id`
    pub async fn search(&self, source_id: SourceId, query: &str, criteria_id: i64) -> Result<Vec<BrowseItem>> {
        if query.is_empty() || query.chars().count() > MAX_SEARCH_LENGTH {
            return Err(HeosError::InvalidArgument(format!(
                "search string must be 1 to {} characters",
                MAX_SEARCH_LENGTH
            )));
        }

        fetch_all(|range: Option<ItemRange>| {
            let command = Command::new("browse", "search")
                .param("sid", source_id)
                .param("search", query)
                .param("scid", criteria_id)
                .param_opt("range", range);
            async move { page_of(self.call(command).await?) }
        })
        .await
    }

    pub async fn add_to_queue(&self, player_id: PlayerId, media: &MediaRef, add_type: AddToQueueType) -> Result<()> {
        self.call(
            Command::new("browse", "add_to_queue")
                .param("pid", player_id)
                .param("sid", media.source_id)
                .param("cid", &media.container_id)
                .param_opt("mid", media.media_id.as_deref())
                .param("aid", add_type),
        )
        .await?;
        Ok(())
    }

    /// Play a stream URL. The device requires `url` to be the last parameter.
    pub async fn play_url(&self, player_id: PlayerId, url: &str) -> Result<()> {
        self.call(
            Command::new("browse", "play_stream")
                .param("pid", player_id)
                .param("url", url),
        )
        .await?;
        Ok(())
    }
}
