/// Text-to-image models known to work with the generation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageModel {
    FluxSchnellFree,
    FluxSchnell,
    FluxDev,
}

impl ImageModel {
    /// Model name for display
    pub fn name(&self) -> &str {
        match self {
            Self::FluxSchnellFree => "FLUX.1 schnell (free)",
            Self::FluxSchnell => "FLUX.1 schnell",
            Self::FluxDev => "FLUX.1 dev",
        }
    }

    /// Model ID for API communication
    pub fn id(&self) -> &str {
        match self {
            Self::FluxSchnellFree => "black-forest-labs/FLUX.1-schnell-Free",
            Self::FluxSchnell => "black-forest-labs/FLUX.1-schnell",
            Self::FluxDev => "black-forest-labs/FLUX.1-dev",
        }
    }

    /// Number of inference steps the model is tuned for
    pub fn default_steps(&self) -> u32 {
        match self {
            Self::FluxSchnellFree | Self::FluxSchnell => 4,
            Self::FluxDev => 28,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|m| m.id().eq_ignore_ascii_case(id))
    }

    /// All available models
    pub fn all() -> [ImageModel; 3] {
        [Self::FluxSchnellFree, Self::FluxSchnell, Self::FluxDev]
    }
}

impl Default for ImageModel {
    fn default() -> Self {
        Self::FluxSchnellFree
    }
}
