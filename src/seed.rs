//! Initial data for local development: a handful of owners and one photo.

use crate::{services::photo_service::NewPhoto, state::AppState};
use anyhow::{Context, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use rand::Rng;
use std::io::Cursor;
use tracing::info;

const SAMPLE_OWNERS: usize = 5;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

struct SampleOwner {
    username: String,
    email: String,
}

/// Create `SAMPLE_OWNERS` owners with random names and one sample photo
/// owned by one of them. Tokens are logged so they can be used right away.
pub async fn seed(state: &AppState) -> Result<()> {
    let (samples, photo_owner, views) = {
        let mut rng = rand::rng();
        let samples: Vec<SampleOwner> = (0..SAMPLE_OWNERS)
            .map(|_| SampleOwner {
                username: random_letters(&mut rng, 10),
                email: format!("{}@gmail.com", random_letters(&mut rng, 6)),
            })
            .collect();
        let photo_owner = rng.random_range(0..SAMPLE_OWNERS);
        let views = if rng.random_bool(0.5) { 0 } else { 100 };
        (samples, photo_owner, views)
    };

    let mut owner_ids = Vec::with_capacity(samples.len());
    for sample in &samples {
        let user = state.users.create(&sample.username, &sample.email).await?;
        info!(
            username = %user.username,
            email = %user.email,
            token = %user.token,
            "created sample owner"
        );
        owner_ids.push(user.id);
    }

    let photo = state
        .photos
        .create(
            owner_ids[photo_owner],
            NewPhoto {
                title: "Sunset".into(),
                filename: "sunset.jpg".into(),
                bytes: sample_image()?.into(),
            },
        )
        .await
        .context("creating sample photo")?;
    state.photos.set_views(photo.id, views).await?;

    info!(photo_id = photo.id, views, "created sample photo");
    Ok(())
}

fn random_letters(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

/// A 640x480 orange-to-purple gradient, JPEG encoded.
fn sample_image() -> Result<Vec<u8>> {
    let (width, height) = (640u32, 480u32);
    let img = ImageBuffer::from_fn(width, height, |_, y| {
        let t = y as f32 / height as f32;
        Rgb([
            (250.0 - 120.0 * t) as u8,
            (160.0 - 130.0 * t) as u8,
            (60.0 + 90.0 * t) as u8,
        ])
    });

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}
