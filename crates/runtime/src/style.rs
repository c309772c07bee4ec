//! Painting style labels and the classifier boundary.
//!
//! Classification itself happens outside this crate: a [`StyleClassifier`]
//! turns image bytes into one of the 27 [`PaintingStyle`] labels.

use std::fmt;
use std::io::ErrorKind;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default time allowed for an external classifier run.
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(60);

macro_rules! painting_styles {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Art style predicted for an uploaded painting.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum PaintingStyle {
            $($variant),+
        }

        impl PaintingStyle {
            /// Every style, in classifier output order.
            pub const ALL: &'static [PaintingStyle] = &[$(PaintingStyle::$variant),+];

            /// Classifier label, e.g. `Post_Impressionism`.
            pub fn label(self) -> &'static str {
                match self {
                    $(PaintingStyle::$variant => $label),+
                }
            }
        }
    };
}

painting_styles! {
    AbstractExpressionism => "Abstract_Expressionism",
    ActionPainting => "Action_painting",
    AnalyticalCubism => "Analytical_Cubism",
    ArtNouveauModern => "Art_Nouveau_Modern",
    Baroque => "Baroque",
    ColorFieldPainting => "Color_Field_Painting",
    ContemporaryRealism => "Contemporary_Realism",
    Cubism => "Cubism",
    EarlyRenaissance => "Early_Renaissance",
    Expressionism => "Expressionism",
    Fauvism => "Fauvism",
    HighRenaissance => "High_Renaissance",
    Impressionism => "Impressionism",
    MannerismLateRenaissance => "Mannerism_Late_Renaissance",
    Minimalism => "Minimalism",
    NaiveArtPrimitivism => "Naive_Art_Primitivism",
    NewRealism => "New_Realism",
    NorthernRenaissance => "Northern_Renaissance",
    Pointillism => "Pointillism",
    PopArt => "Pop_Art",
    PostImpressionism => "Post_Impressionism",
    Realism => "Realism",
    Rococo => "Rococo",
    Romanticism => "Romanticism",
    Symbolism => "Symbolism",
    SyntheticCubism => "Synthetic_Cubism",
    UkiyoE => "Ukiyo_e",
}

impl PaintingStyle {
    /// Position in the classifier's output layer.
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|style| *style == self)
            .unwrap_or_default()
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for PaintingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PaintingStyle {
    type Err = ClassifyError;

    /// Accepts the exact label or a loose spelling such as `pop art`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .iter()
            .copied()
            .find(|style| normalize(style.label()) == wanted)
            .ok_or_else(|| ClassifyError::UnknownLabel(s.trim().to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Classification failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClassifyError {
    #[error("unknown painting style: {0}")]
    UnknownLabel(String),

    #[error("failed to run classifier: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns image bytes into a style label.
///
/// Expensive to construct; build one at startup and share it.
#[async_trait]
pub trait StyleClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<PaintingStyle, ClassifyError>;
}

/// Classifier that delegates to an external process.
///
/// The image is written to the process's stdin; its stdout must be a style
/// label or a class index.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, image: &[u8]) -> Result<PaintingStyle, ClassifyError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdin"))?;

        // Feed stdin while draining stdout/stderr so a chatty child cannot
        // fill its pipes and stall on us.
        let feed = async move {
            let written = stdin.write_all(image).await;
            drop(stdin);
            match written {
                // The child may take the image some other way and exit early.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            return Err(ClassifyError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        written?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout)
    }
}

#[async_trait]
impl StyleClassifier for CommandClassifier {
    async fn classify(&self, image: &[u8]) -> Result<PaintingStyle, ClassifyError> {
        debug!(command = %self.command, bytes = image.len(), "classifying painting");
        tokio::time::timeout(self.timeout, self.run(image))
            .await
            .map_err(|_| ClassifyError::Timeout(self.timeout))?
    }
}

fn parse_output(raw: &str) -> Result<PaintingStyle, ClassifyError> {
    let label = raw.trim();
    match label.parse::<usize>() {
        Ok(index) => PaintingStyle::from_index(index)
            .ok_or_else(|| ClassifyError::UnknownLabel(label.to_string())),
        Err(_) => label.parse(),
    }
}
