/// Namespace shared by every topic the patient uses.
pub const TOPIC_ROOT: &str = "cis441-541";

/// The topics one virtual patient publishes and subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Profile announcements, with request/response sub-topics beneath it.
    pub attributes: String,
    /// Dashboard telemetry.
    pub telemetry: String,
    /// Inbound basal-rate commands.
    pub insulin: String,
    /// Simulated CGM readings.
    pub cgm: String,
}

impl Topics {
    /// Default topics for a team, all under `cis441-541/<team>`.
    #[must_use]
    pub fn for_team(team: &str) -> Self {
        let prefix = format!("{TOPIC_ROOT}/{team}");
        Self {
            attributes: format!("{prefix}/vp-attributes"),
            telemetry: format!("{prefix}/vp-telemetry"),
            insulin: format!("{prefix}/insulin-pump"),
            cgm: format!("{prefix}/cgm"),
        }
    }

    #[must_use]
    pub fn with_insulin(mut self, topic: impl Into<String>) -> Self {
        self.insulin = topic.into();
        self
    }

    #[must_use]
    pub fn with_cgm(mut self, topic: impl Into<String>) -> Self {
        self.cgm = topic.into();
        self
    }

    /// Filter matching every profile request, `<attributes>/request/+`.
    #[must_use]
    pub fn request_filter(&self) -> String {
        format!("{}/request/+", self.attributes)
    }

    /// Maps `<attributes>/request/<id>` to `<attributes>/response/<id>`.
    ///
    /// Returns `None` for any other topic.
    #[must_use]
    pub fn response_topic(&self, request_topic: &str) -> Option<String> {
        let id = request_topic
            .strip_prefix(self.attributes.as_str())?
            .strip_prefix("/request/")?;
        Some(format!("{}/response/{id}", self.attributes))
    }
}
