//! Where exams come from.
//!
//! Built-in exams are embedded at compile time from `src/exams`. Exams written
//! by question authors live as JSON files in the user's exam directory and
//! shadow built-ins with the same id.

use include_dir::{include_dir, Dir};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::exam::{CatalogSource, ExamDefinition, ExamSummary, InvalidExam, Question};

static EXAM_DIR: Dir = include_dir!("src/exams");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("exam '{0}' not found")]
    NotFound(String),
    #[error("exam '{id}' is invalid: {source}")]
    Invalid {
        id: String,
        #[source]
        source: InvalidExam,
    },
    #[error("'{0}' is not a valid exam id (use letters, digits, '-' or '_')")]
    InvalidId(String),
    #[error("question '{question_id}' not found in exam '{exam_id}'")]
    QuestionNotFound {
        exam_id: String,
        question_id: String,
    },
    #[error("exam '{exam_id}' already has a question '{question_id}'")]
    DuplicateQuestion {
        exam_id: String,
        question_id: String,
    },
    #[error("cannot remove the last question of exam '{0}'")]
    LastQuestion(String),
    #[error("built-in exam '{0}' cannot be removed")]
    BuiltinReadOnly(String),
    #[error("malformed exam file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read side of the exam store. Callers never get to mutate what they load.
pub trait ExamCatalog {
    fn list(&self) -> Result<Vec<ExamSummary>, CatalogError>;
    fn load_exam(&self, id: &str) -> Result<ExamDefinition, CatalogError>;
}

fn checked(exam: ExamDefinition) -> Result<ExamDefinition, CatalogError> {
    exam.validate().map_err(|source| CatalogError::Invalid {
        id: exam.id.clone(),
        source,
    })?;
    Ok(exam)
}

fn sorted(summaries: Vec<ExamSummary>) -> Vec<ExamSummary> {
    summaries
        .into_iter()
        .sorted_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)))
        .collect()
}

pub fn is_valid_exam_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Exams shipped inside the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    fn exams(&self) -> Result<Vec<ExamDefinition>, CatalogError> {
        EXAM_DIR
            .files()
            .filter(|f| f.path().extension().is_some_and(|ext| ext == "json"))
            .map(|f| {
                serde_json::from_slice::<ExamDefinition>(f.contents()).map_err(|source| {
                    CatalogError::Json {
                        path: f.path().to_path_buf(),
                        source,
                    }
                })
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.exams()
            .map(|exams| exams.iter().any(|e| e.id == id))
            .unwrap_or(false)
    }
}

impl ExamCatalog for BuiltinCatalog {
    fn list(&self) -> Result<Vec<ExamSummary>, CatalogError> {
        Ok(sorted(
            self.exams()?
                .iter()
                .map(|e| e.summary(CatalogSource::Builtin))
                .collect(),
        ))
    }

    fn load_exam(&self, id: &str) -> Result<ExamDefinition, CatalogError> {
        let exam = self
            .exams()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        checked(exam)
    }
}

/// Exams stored as `<id>.json` files in a directory.
#[derive(Debug, Clone)]
pub struct DirCatalog {
    dir: PathBuf,
}

impl DirCatalog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read_file(path: &Path) -> Result<ExamDefinition, CatalogError> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|source| CatalogError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn json_files(&self) -> Result<Vec<PathBuf>, CatalogError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).ok().flatten().is_some()
    }

    /// Locates the file holding exam `id`. `<id>.json` is tried first, then
    /// every file in the directory is matched on the id it contains.
    fn find(&self, id: &str) -> Result<Option<(PathBuf, ExamDefinition)>, CatalogError> {
        let direct = self.path_for(id);
        if is_valid_exam_id(id) && direct.is_file() {
            let exam = Self::read_file(&direct)?;
            if exam.id == id {
                return Ok(Some((direct, exam)));
            }
        }

        for path in self.json_files()? {
            match Self::read_file(&path) {
                Ok(exam) if exam.id == id => return Ok(Some((path, exam))),
                Ok(_) => {}
                Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping exam file"),
            }
        }
        Ok(None)
    }

    /// Validates and writes the exam, replacing any previous version.
    pub fn save_exam(&self, exam: &ExamDefinition) -> Result<(), CatalogError> {
        if !is_valid_exam_id(&exam.id) {
            return Err(CatalogError::InvalidId(exam.id.clone()));
        }
        exam.validate().map_err(|source| CatalogError::Invalid {
            id: exam.id.clone(),
            source,
        })?;

        fs::create_dir_all(&self.dir)?;
        // overwrite the file already holding this id, whatever it is called
        let path = match self.find(&exam.id) {
            Ok(Some((path, _))) => path,
            _ => self.path_for(&exam.id),
        };
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(exam).map_err(|source| CatalogError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;

        tracing::info!(exam_id = %exam.id, path = %path.display(), "exam saved");
        Ok(())
    }

    pub fn remove_exam(&self, id: &str) -> Result<(), CatalogError> {
        let path = match self.find(id) {
            Ok(Some((path, _))) => path,
            Ok(None) => return Err(CatalogError::NotFound(id.to_string())),
            // an unreadable `<id>.json` can still be removed by name
            Err(CatalogError::Json { path, .. }) => path,
            Err(e) => return Err(e),
        };
        fs::remove_file(&path)?;
        tracing::info!(exam_id = %id, path = %path.display(), "exam removed");
        Ok(())
    }
}

impl ExamCatalog for DirCatalog {
    fn list(&self) -> Result<Vec<ExamSummary>, CatalogError> {
        let mut summaries = Vec::new();
        for path in self.json_files()? {
            match Self::read_file(&path).and_then(checked) {
                Ok(exam) => summaries.push(exam.summary(CatalogSource::Local)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unusable exam file")
                }
            }
        }
        Ok(sorted(summaries))
    }

    fn load_exam(&self, id: &str) -> Result<ExamDefinition, CatalogError> {
        let (_, exam) = self
            .find(id)?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        checked(exam)
    }
}

/// Local exams layered over the built-in ones. Authoring always writes to the
/// local layer; editing a built-in exam saves a local copy that shadows it.
#[derive(Debug, Clone)]
pub struct LayeredCatalog {
    local: DirCatalog,
    builtin: BuiltinCatalog,
}

impl LayeredCatalog {
    pub fn new(local: DirCatalog) -> Self {
        Self {
            local,
            builtin: BuiltinCatalog,
        }
    }

    pub fn local(&self) -> &DirCatalog {
        &self.local
    }

    pub fn add_question(
        &self,
        exam_id: &str,
        question: Question,
    ) -> Result<ExamDefinition, CatalogError> {
        let mut exam = self.load_exam(exam_id)?;
        if exam.questions.iter().any(|q| q.id == question.id) {
            return Err(CatalogError::DuplicateQuestion {
                exam_id: exam_id.to_string(),
                question_id: question.id,
            });
        }
        question.validate().map_err(|source| CatalogError::Invalid {
            id: exam_id.to_string(),
            source,
        })?;

        tracing::info!(exam_id = %exam_id, question_id = %question.id, "adding question");
        exam.questions.push(question);
        self.local.save_exam(&exam)?;
        Ok(exam)
    }

    pub fn remove_question(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<ExamDefinition, CatalogError> {
        let mut exam = self.load_exam(exam_id)?;
        let position = exam
            .questions
            .iter()
            .position(|q| q.id == question_id)
            .ok_or_else(|| CatalogError::QuestionNotFound {
                exam_id: exam_id.to_string(),
                question_id: question_id.to_string(),
            })?;
        if exam.questions.len() == 1 {
            return Err(CatalogError::LastQuestion(exam_id.to_string()));
        }

        tracing::info!(exam_id = %exam_id, question_id = %question_id, "removing question");
        exam.questions.remove(position);
        self.local.save_exam(&exam)?;
        Ok(exam)
    }

    /// Removes a local exam. Built-in exams are read-only, but removing a
    /// local copy that shadows one brings the built-in version back.
    pub fn remove_exam(&self, id: &str) -> Result<(), CatalogError> {
        match self.local.remove_exam(id) {
            Err(CatalogError::NotFound(_)) if self.builtin.contains(id) => {
                Err(CatalogError::BuiltinReadOnly(id.to_string()))
            }
            other => other,
        }
    }

    /// Reads an exam file from anywhere and stores it in the local layer.
    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> Result<ExamDefinition, CatalogError> {
        let exam = checked(DirCatalog::read_file(path.as_ref())?)?;
        self.local.save_exam(&exam)?;
        Ok(exam)
    }
}

impl ExamCatalog for LayeredCatalog {
    fn list(&self) -> Result<Vec<ExamSummary>, CatalogError> {
        let local = self.local.list()?;
        let shadowed = self
            .builtin
            .list()?
            .into_iter()
            .filter(|b| !local.iter().any(|l| l.id == b.id));
        Ok(sorted(local.iter().cloned().chain(shadowed).collect()))
    }

    /// A local file that cannot be used does not shadow the built-in exam,
    /// matching what `list` shows.
    fn load_exam(&self, id: &str) -> Result<ExamDefinition, CatalogError> {
        match self.local.load_exam(id) {
            Err(CatalogError::NotFound(_)) => self.builtin.load_exam(id),
            Err(e @ (CatalogError::Invalid { .. } | CatalogError::Json { .. }))
                if self.builtin.contains(id) =>
            {
                tracing::warn!(exam_id = %id, error = %e, "unusable local copy, using built-in exam");
                self.builtin.load_exam(id)
            }
            other => other,
        }
    }
}
