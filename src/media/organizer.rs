//! Library layout for transferred files

use std::path::{Path, PathBuf};

use super::MediaType;

/// Builds destination paths inside a library root
pub struct MediaOrganizer {
    root: PathBuf,
}

impl MediaOrganizer {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Folder name for a title, `Title (Year)` when the year is known
    pub fn title_folder(title: &str, year: Option<&str>) -> String {
        let title = sanitize_filename::sanitize(title);
        match year.filter(|y| !y.is_empty()) {
            Some(year) => format!("{} ({})", title, year),
            None => title,
        }
    }

    /// `<root>/Title (Year)/Title (Year).ext`
    pub fn movie_path(&self, title: &str, year: Option<&str>, extension: &str) -> PathBuf {
        let folder = Self::title_folder(title, year);
        let file_name = format!("{}{}", folder, extension);
        self.root.join(&folder).join(file_name)
    }

    /// `<root>/Title (Year)/Season 01/Title - S01E05.ext`, or the original
    /// file name when the episode number is unknown
    pub fn episode_path(
        &self,
        title: &str,
        year: Option<&str>,
        season: u32,
        episode: Option<u32>,
        original_name: &str,
        extension: &str,
    ) -> PathBuf {
        let folder = Self::title_folder(title, year);
        let season_folder = format!("Season {:02}", season);
        let file_name = match episode {
            Some(ep) => format!(
                "{} - S{:02}E{:02}{}",
                sanitize_filename::sanitize(title),
                season,
                ep,
                extension
            ),
            None => sanitize_filename::sanitize(original_name),
        };
        self.root.join(folder).join(season_folder).join(file_name)
    }

    /// Destination for a file of the given category
    #[allow(clippy::too_many_arguments)]
    pub fn destination(
        &self,
        media_type: MediaType,
        title: &str,
        year: Option<&str>,
        season: Option<u32>,
        episode: Option<u32>,
        original_name: &str,
        extension: &str,
    ) -> PathBuf {
        match media_type {
            MediaType::Movie => self.movie_path(title, year, extension),
            MediaType::Tv | MediaType::Anime => self.episode_path(
                title,
                year,
                season.unwrap_or(1),
                episode,
                original_name,
                extension,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_path() {
        let organizer = MediaOrganizer::new(Path::new("/library/movies"));
        assert_eq!(
            organizer.movie_path("The Matrix", Some("1999"), ".mkv"),
            PathBuf::from("/library/movies/The Matrix (1999)/The Matrix (1999).mkv")
        );
    }

    #[test]
    fn test_episode_path() {
        let organizer = MediaOrganizer::new(Path::new("/library/tv"));
        assert_eq!(
            organizer.episode_path("Chicago Fire", Some("2012"), 14, Some(8), "x.mkv", ".mkv"),
            PathBuf::from("/library/tv/Chicago Fire (2012)/Season 14/Chicago Fire - S14E08.mkv")
        );
        assert_eq!(
            organizer.episode_path("Show", None, 1, None, "Show extra.mkv", ".mkv"),
            PathBuf::from("/library/tv/Show/Season 01/Show extra.mkv")
        );
    }

    #[test]
    fn test_title_is_sanitized() {
        assert_eq!(MediaOrganizer::title_folder("AC/DC: Live", None), "ACDC Live");
    }
}
