//! Read-only page queries

use std::collections::BTreeMap;

use super::prelude::*;
use super::sync_paths::sync_path_view;
use crate::media::paths::to_forward_slashes;
use crate::services::MediaInfo;
use crate::services::system::library_space;

const TERABYTE: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
pub struct NameTestRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMediaRequest {
    #[serde(default, deserialize_with = "params::opt_string")]
    pub keyword: Option<String>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub searchtype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferHistoryQuery {
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub pagenum: Option<i64>,
    #[serde(default, deserialize_with = "params::opt_string")]
    pub keyword: Option<String>,
    #[serde(default, deserialize_with = "params::opt_i64")]
    pub page: Option<i64>,
}

/// `1234567` → `1,234,567`
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 { format!("-{}", out) } else { out }
}

fn terabytes(bytes: u64) -> String {
    format!("{:.2} TB", bytes as f64 / TERABYTE)
}

/// Chart data of `get_transfer_statistics`: movies on their own axis, tv and
/// anime sharing day buckets
#[derive(Debug, Default, PartialEq)]
struct TransferCharts {
    movie_labels: Vec<String>,
    movie_nums: Vec<i64>,
    tv_labels: Vec<String>,
    tv_nums: Vec<i64>,
    anime_nums: Vec<i64>,
}

fn transfer_charts(counts: &[TransferDayCount]) -> TransferCharts {
    let mut charts = TransferCharts::default();
    let mut series: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for count in counts {
        match count.media_type.as_str() {
            "movie" => {
                charts.movie_labels.push(count.day.clone());
                charts.movie_nums.push(count.count);
            }
            "tv" => series.entry(&count.day).or_default().0 += count.count,
            "anime" => series.entry(&count.day).or_default().1 += count.count,
            other => debug!(media_type = other, "Skipping unknown media type in statistics"),
        }
    }
    for (day, (tv, anime)) in series {
        charts.tv_labels.push(day.to_string());
        charts.tv_nums.push(tv);
        charts.anime_nums.push(anime);
    }
    charts
}

impl WebActions {
    pub(super) async fn name_test(&self, req: NameTestRequest) -> ActionResult {
        let name = req.name.ok_or_else(|| ActionError::invalid("name is required"))?;
        let words = self.words.process(&name, None);
        let mut media = MediaInfo::from_words(&name, words);
        media.tmdb = self.metadata.recognize(&media).await?;
        Ok(ActionReply::ok().field("data", media.to_test_view()))
    }

    pub(super) async fn search_media_infos(&self, req: SearchMediaRequest) -> ActionResult {
        let Some(keyword) = req.keyword else {
            return Ok(ActionReply::ok().field("result", Vec::<Value>::new()));
        };
        let medias = self.metadata.search(&keyword, req.searchtype.as_deref()).await?;
        Ok(ActionReply::ok().field("result", medias))
    }

    pub(super) async fn get_transfer_history(&self, req: TransferHistoryQuery) -> ActionResult {
        let page_num = req.pagenum.filter(|n| *n > 0).unwrap_or(30);
        let current_page = req.page.filter(|p| *p > 0).unwrap_or(1);
        let (total, rows) = self
            .db
            .transfer_history()
            .list(req.keyword.as_deref(), current_page, page_num)
            .await?;

        let result: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                let rmt_mode = RmtMode::parse(&row.mode).map(|m| m.label()).unwrap_or_default();
                let sync_mode = row.mode.clone();
                let mut value = serde_json::to_value(row).unwrap_or_else(|_| json!({}));
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("SYNC_MODE".to_string(), json!(sync_mode));
                    obj.insert("RMT_MODE".to_string(), json!(rmt_mode));
                }
                value
            })
            .collect();

        Ok(ActionReply::ok()
            .field("total", total)
            .field("result", result)
            .field("totalPage", total / page_num + 1)
            .field("pageNum", page_num)
            .field("currentPage", current_page))
    }

    pub(super) async fn get_unknown_list(&self) -> ActionResult {
        let items: Vec<Value> = self
            .db
            .transfer_unknown()
            .list_pending()
            .await?
            .into_iter()
            .filter(|rec| !rec.path.is_empty())
            .map(|rec| {
                let path = to_forward_slashes(&rec.path);
                let rmt_mode = RmtMode::parse(&rec.mode).map(|m| m.label()).unwrap_or_default();
                json!({
                    "id": rec.id,
                    "path": path,
                    "to": to_forward_slashes(&rec.dest),
                    "name": path,
                    "sync_mode": rec.mode,
                    "rmt_mode": rmt_mode,
                })
            })
            .collect();
        Ok(ActionReply::ok().field("items", items))
    }

    pub(super) async fn get_directorysync(&self) -> ActionResult {
        let mut paths = self.db.sync_paths().list().await?;
        paths.sort_by(|a, b| a.source.cmp(&b.source));
        let result: Vec<Value> = paths.iter().map(sync_path_view).collect();
        Ok(ActionReply::ok().field("result", result))
    }

    pub(super) async fn get_users(&self) -> ActionResult {
        let users: Vec<Value> = self
            .db
            .users()
            .list()
            .await?
            .into_iter()
            .map(|u| {
                let pris: Vec<&str> = u.pris.split(',').collect();
                json!({ "id": u.id, "name": u.name, "pris": pris })
            })
            .collect();
        Ok(ActionReply::ok().field("result", users))
    }

    pub(super) async fn get_transfer_statistics(&self) -> ActionResult {
        let counts = self.db.transfer_history().statistics(30).await?;
        let charts = transfer_charts(&counts);
        Ok(ActionReply::ok()
            .field("MovieChartLabels", charts.movie_labels)
            .field("MovieNums", charts.movie_nums)
            .field("TvChartLabels", charts.tv_labels)
            .field("TvNums", charts.tv_nums)
            .field("AnimeNums", charts.anime_nums))
    }

    pub(super) fn get_library_spacesize(&self) -> ActionResult {
        let space = library_space(&self.settings.snapshot().library_paths());
        let used_percent = if space.total > 0 {
            format!("{:.1}", space.used() as f64 / space.total as f64 * 100.0)
        } else {
            "0".to_string()
        };
        Ok(ActionReply::ok()
            .field("UsedPercent", used_percent)
            .field("FreeSpace", terabytes(space.free))
            .field("UsedSapce", terabytes(space.used()))
            .field("TotalSpace", terabytes(space.total)))
    }

    pub(super) async fn get_library_mediacount(&self) -> ActionResult {
        let server = self.media_sync.server();
        let counts = match server.media_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Media server unreachable");
                return Ok(ActionReply::with_code(-1).msg("media server connection failed"));
            }
        };
        let users = server.user_count().await.unwrap_or(0);
        let episodes = if counts.episode > 0 { thousands(counts.episode) } else { String::new() };
        Ok(ActionReply::ok()
            .field("Movie", thousands(counts.movie))
            .field("Series", thousands(counts.tv))
            .field("Episodes", episodes)
            .field("Music", thousands(counts.music))
            .field("User", users))
    }

    pub(super) async fn get_library_playhistory(&self) -> ActionResult {
        let activity = self.media_sync.server().activity_log(30).await?;
        Ok(ActionReply::ok().field("result", activity))
    }

    pub(super) fn get_rmt_modes(&self) -> ActionResult {
        let modes = if self.config.lite_version {
            RmtMode::LITE
        } else {
            RmtMode::ALL
        };
        let result: Vec<Value> = modes
            .iter()
            .map(|m| json!({ "value": m.key(), "name": m.label() }))
            .collect();
        Ok(ActionReply::ok().field("result", result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(media_type: &str, day: &str, count: i64) -> TransferDayCount {
        TransferDayCount {
            media_type: media_type.to_string(),
            day: day.to_string(),
            count,
        }
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-1000), "-1,000");
    }

    #[test]
    fn test_transfer_charts_bucket_tv_and_anime() {
        let charts = transfer_charts(&[
            day("movie", "2024-01-01", 3),
            day("tv", "2024-01-01", 2),
            day("anime", "2024-01-02", 5),
            day("tv", "2024-01-02", 1),
        ]);
        assert_eq!(charts.movie_labels, vec!["2024-01-01"]);
        assert_eq!(charts.movie_nums, vec![3]);
        assert_eq!(charts.tv_labels, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(charts.tv_nums, vec![2, 1]);
        assert_eq!(charts.anime_nums, vec![0, 5]);
    }
}
