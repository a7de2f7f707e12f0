use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_shared::slug::slugify;

use crate::product::{CatalogError, MAX_TITLE_LEN};

/// Profile of an artist represented by the gallery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub bio: Option<String>,
    pub nationality: Option<String>,
    pub birth_year: Option<i32>,
    pub website: Option<String>,
    pub avatar_media_id: Option<Uuid>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArtist {
    pub name: String,
    pub bio: Option<String>,
    pub nationality: Option<String>,
    pub birth_year: Option<i32>,
    pub website: Option<String>,
    pub avatar_media_id: Option<Uuid>,
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtistPatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub nationality: Option<String>,
    pub birth_year: Option<i32>,
    pub website: Option<String>,
    pub avatar_media_id: Option<Uuid>,
    pub featured: Option<bool>,
}

impl NewArtist {
    pub fn validate(&self) -> Result<(), CatalogError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CatalogError::Validation("name is required".into()));
        }
        if name.chars().count() > MAX_TITLE_LEN {
            return Err(CatalogError::Validation(format!(
                "name must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if let Some(year) = self.birth_year {
            if year < 1000 || year > Utc::now().year() {
                return Err(CatalogError::Validation("birth year is out of range".into()));
            }
        }
        if let Some(site) = &self.website {
            if !(site.starts_with("https://") || site.starts_with("http://")) {
                return Err(CatalogError::Validation("website must be an http(s) URL".into()));
            }
        }
        Ok(())
    }
}

impl Artist {
    pub fn from_new(input: NewArtist) -> Result<Self, CatalogError> {
        input.validate()?;
        let now = Utc::now();
        let name = input.name.trim().to_string();
        Ok(Self {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            bio: input.bio,
            nationality: input.nationality,
            birth_year: input.birth_year,
            website: input.website,
            avatar_media_id: input.avatar_media_id,
            featured: input.featured,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_patch(&mut self, patch: ArtistPatch) -> Result<(), CatalogError> {
        let draft = NewArtist {
            name: patch.name.unwrap_or_else(|| self.name.clone()),
            bio: patch.bio.or_else(|| self.bio.clone()),
            nationality: patch.nationality.or_else(|| self.nationality.clone()),
            birth_year: patch.birth_year.or(self.birth_year),
            website: patch.website.or_else(|| self.website.clone()),
            avatar_media_id: patch.avatar_media_id.or(self.avatar_media_id),
            featured: patch.featured.unwrap_or(self.featured),
        };
        draft.validate()?;

        let name = draft.name.trim().to_string();
        if name != self.name {
            self.slug = slugify(&name);
        }
        self.name = name;
        self.bio = draft.bio;
        self.nationality = draft.nationality;
        self.birth_year = draft.birth_year;
        self.website = draft.website;
        self.avatar_media_id = draft.avatar_media_id;
        self.featured = draft.featured;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewArtist {
        NewArtist {
            name: "Mira Okafor".to_string(),
            bio: None,
            nationality: Some("Nigerian".to_string()),
            birth_year: Some(1984),
            website: Some("https://mira.example".to_string()),
            avatar_media_id: None,
            featured: true,
        }
    }

    #[test]
    fn test_create_artist() {
        let artist = Artist::from_new(sample()).unwrap();
        assert_eq!(artist.slug, "mira-okafor");
        assert!(artist.featured);
    }

    #[test]
    fn test_rejects_bad_website() {
        let input = NewArtist { website: Some("mira.example".to_string()), ..sample() };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_patch_renames() {
        let mut artist = Artist::from_new(sample()).unwrap();
        artist
            .apply_patch(ArtistPatch { name: Some("Mira O. Okafor".to_string()), ..Default::default() })
            .unwrap();
        assert_eq!(artist.slug, "mira-o-okafor");
        assert_eq!(artist.birth_year, Some(1984));
    }
}
