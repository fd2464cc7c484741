//! Store key layout for one build.

use release_types::Build;

/// Key builder for the areas of one build in the file store.
///
/// Everything belonging to a build sits under
/// `<center>/<product>/<build>/`: authored inputs in `input/`, the manifest
/// under `manifest/`, the sequential pre-assignment pass's intermediates in
/// `transformed-input/`, final transformed files in `transformed/` and
/// packaged release files in `output/`. Published packages live outside the
/// build, under `published/<center>/<package>/`, where the package name is
/// the unique id of the build that produced it; a later build names that
/// package as its previous release.
#[derive(Debug, Clone)]
pub struct BuildPaths {
    root: String,
    release_center_key: String,
    package: String,
}

impl BuildPaths {
    /// Creates the key builder for one build.
    pub fn new(build: &Build) -> Self {
        BuildPaths {
            root: format!(
                "{}/{}/{}",
                build.release_center_key,
                build.product_key,
                build.unique_id()
            ),
            release_center_key: build.release_center_key.clone(),
            package: build.unique_id(),
        }
    }

    /// Prefix of the authored input files.
    pub fn input(&self) -> String {
        format!("{}/input/", self.root)
    }

    /// Key of one input file.
    pub fn input_file(&self, name: &str) -> String {
        format!("{}/input/{name}", self.root)
    }

    /// Prefix of the manifest area.
    pub fn manifest(&self) -> String {
        format!("{}/manifest/", self.root)
    }

    /// Prefix of the pre-assignment intermediates.
    pub fn transformed_input(&self) -> String {
        format!("{}/transformed-input/", self.root)
    }

    /// Key of one pre-assignment intermediate file.
    pub fn transformed_input_file(&self, name: &str) -> String {
        format!("{}/transformed-input/{name}", self.root)
    }

    /// Prefix of the transformed output files.
    pub fn transformed(&self) -> String {
        format!("{}/transformed/", self.root)
    }

    /// Key of one transformed output file.
    pub fn transformed_file(&self, name: &str) -> String {
        format!("{}/transformed/{name}", self.root)
    }

    /// Prefix of the packaged release files.
    pub fn output(&self) -> String {
        format!("{}/output/", self.root)
    }

    /// Key of one packaged release file.
    pub fn output_file(&self, name: &str) -> String {
        format!("{}/output/{name}", self.root)
    }

    /// Key of the input-prepare report, when input gathering produced one.
    pub fn input_prepare_report(&self) -> String {
        format!("{}/input-prepare-report.json", self.root)
    }

    /// Prefix of the release center's published area.
    pub fn published(&self) -> String {
        format!("published/{}/", self.release_center_key)
    }

    /// Key of one file in this build's published package.
    pub fn published_file(&self, name: &str) -> String {
        format!("published/{}/{}/{name}", self.release_center_key, self.package)
    }
}

#[cfg(test)]
mod tests {
    use release_types::BuildConfiguration;

    use super::*;

    #[test]
    fn test_keys_are_scoped_by_build() {
        let build = Build::new(
            "international",
            "snomed_release",
            "20240101120000",
            BuildConfiguration::new("20240101"),
        );
        let paths = BuildPaths::new(&build);
        assert_eq!(
            paths.input_file("sct2_Concept_Delta_INT_20240101.txt"),
            "international/snomed_release/snomed_release_20240101120000/input/sct2_Concept_Delta_INT_20240101.txt"
        );
        assert_eq!(
            paths.transformed(),
            "international/snomed_release/snomed_release_20240101120000/transformed/"
        );
        assert_eq!(paths.published(), "published/international/");
        assert_eq!(
            paths.published_file("sct2_Concept_Snapshot_INT_20240101.txt"),
            "published/international/snomed_release_20240101120000/sct2_Concept_Snapshot_INT_20240101.txt"
        );
    }
}
