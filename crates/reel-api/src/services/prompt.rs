//! Prompt composition for image-to-video generation.

use reel_models::ShotType;

const STYLE_PREFIX: &str = "Cinematic music video scene, consistent character appearance";

const CALM_SUFFIX: &str =
    "Smooth, slow and subtle motion. Stable framing, no sudden cuts, no morphing.";

/// Camera-movement clause for a framing.
pub fn camera_clause(shot_type: ShotType) -> &'static str {
    match shot_type {
        ShotType::Wide => "slow wide pan across the scene",
        ShotType::Medium => "gentle dolly in toward the subject",
        ShotType::CloseUp => "subtle push in on the face",
        ShotType::ExtremeCloseUp => "almost static camera with a faint drift",
        ShotType::Establishing => "slow sweeping reveal of the location",
        ShotType::OverTheShoulder => "soft handheld sway over the shoulder",
        ShotType::Aerial => "slow aerial glide above the scene",
    }
}

/// Final instruction text sent upstream: style prefix, camera clause,
/// the caller's motion description, calm-motion suffix.
pub fn compose_prompt(shot_type: ShotType, motion: &str) -> String {
    let motion = motion.trim().trim_end_matches('.');
    let mut parts = vec![STYLE_PREFIX, camera_clause(shot_type)];
    if !motion.is_empty() {
        parts.push(motion);
    }

    let mut prompt = parts.join(", ");
    prompt.push_str(". ");
    prompt.push_str(CALM_SUFFIX);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_orders_parts() {
        let prompt = compose_prompt(ShotType::CloseUp, "  she turns toward the window. ");
        let prefix = prompt.find(STYLE_PREFIX).unwrap();
        let camera = prompt.find("subtle push in").unwrap();
        let motion = prompt.find("she turns toward the window").unwrap();
        let suffix = prompt.find(CALM_SUFFIX).unwrap();
        assert!(prefix < camera && camera < motion && motion < suffix);
        assert!(!prompt.contains("window.."));
    }

    #[test]
    fn test_compose_without_motion() {
        let prompt = compose_prompt(ShotType::Wide, "   ");
        assert_eq!(
            prompt,
            format!("{}, slow wide pan across the scene. {}", STYLE_PREFIX, CALM_SUFFIX)
        );
    }
}
