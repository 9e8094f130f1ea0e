//! Generated Dockerfiles for the per-language image buildpacks.

use crate::bundler::{Language, ResolvedLanguage};
use crate::workload::{EntryPoint, JavaBuildTool, JsPackageManager, PythonPackageManager, PythonRunMode};
use std::fmt;

const PYTHON_APP_PORT: &str = "8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    From(String),
    FromAs(String, String),
    Workdir(String),
    Copy(String, String),
    CopyFrom(String, String, String), // (stage, src, dst)
    Run(String),
    Env(String, String),
    Expose(String),
    Cmd(Vec<String>),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::From(image) => write!(f, "FROM {}", image),
            Self::FromAs(image, stage) => write!(f, "FROM {} AS {}", image, stage),
            Self::Workdir(dir) => write!(f, "WORKDIR {}", dir),
            Self::Copy(src, dst) => write!(f, "COPY {} {}", src, dst),
            Self::CopyFrom(stage, src, dst) => write!(f, "COPY --from={} {} {}", stage, src, dst),
            Self::Run(cmd) => write!(f, "RUN {}", cmd),
            Self::Env(key, value) => write!(f, "ENV {}={}", key, value),
            Self::Expose(port) => write!(f, "EXPOSE {}", port),
            // Exec form is a JSON array
            Self::Cmd(args) => write!(f, "CMD {}", serde_json::Value::from(args.clone())),
        }
    }
}

/// Everything a generated Dockerfile depends on. Also hashed into the image digest.
#[derive(Debug, Clone)]
pub struct DockerfileParams<'a> {
    pub language: Language,
    pub version: &'a str,
    pub resolved: &'a ResolvedLanguage,
    pub entry: &'a EntryPoint,
    pub requires_glibc: bool,
    pub custom_build_commands: &'a [String],
}

#[derive(Debug, Default, Clone)]
pub struct Dockerfile {
    instructions: Vec<Instruction>,
}

impl Dockerfile {
    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Image of the final stage.
    pub fn runtime_image(&self) -> Option<&str> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::From(image) | Instruction::FromAs(image, _) => Some(image.as_str()),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for instruction in &self.instructions {
            out.push_str(&instruction.to_string());
            out.push('\n');
        }
        out
    }

    fn run_custom(&mut self, commands: &[String]) {
        for cmd in commands.iter().filter(|c| !c.trim().is_empty()) {
            self.push(Instruction::Run(cmd.clone()));
        }
    }
}

pub fn generate(params: &DockerfileParams<'_>) -> Dockerfile {
    match params.resolved {
        ResolvedLanguage::Python {
            package_manager,
            run_app_as,
            ..
        } => python(params, *package_manager, *run_app_as),
        ResolvedLanguage::Javascript {
            package_manager, ..
        } => node(params, *package_manager),
        ResolvedLanguage::Java { build_tool } => java(params, *build_tool),
        ResolvedLanguage::Go { ldflags } => go(params, ldflags.as_deref()),
    }
}

/// Final-stage image: alpine unless glibc binaries are required.
pub fn runtime_base_image(language: Language, version: &str, requires_glibc: bool) -> String {
    match (language, requires_glibc) {
        (Language::Python, false) => format!("python:{}-alpine", version),
        (Language::Python, true) => format!("python:{}-slim", version),
        (Language::Javascript, false) => format!("node:{}-alpine", version),
        (Language::Javascript, true) => format!("node:{}-slim", version),
        (Language::Java, false) => format!("eclipse-temurin:{}-jre-alpine", version),
        (Language::Java, true) => format!("eclipse-temurin:{}-jre", version),
        (Language::Go, false) => "alpine:3.20".to_string(),
        (Language::Go, true) => "debian:bookworm-slim".to_string(),
    }
}

fn python(
    params: &DockerfileParams<'_>,
    package_manager: PythonPackageManager,
    run_app_as: PythonRunMode,
) -> Dockerfile {
    let mut df = Dockerfile::default();
    df.push(Instruction::From(runtime_base_image(
        Language::Python,
        params.version,
        params.requires_glibc,
    )))
    .push(Instruction::Workdir("/app".to_string()))
    .push(Instruction::Env("PYTHONUNBUFFERED".to_string(), "1".to_string()))
    .push(Instruction::Copy(".".to_string(), ".".to_string()));

    let install = match package_manager {
        PythonPackageManager::Pip => "if [ -f requirements.txt ]; then pip install --no-cache-dir -r requirements.txt; else pip install --no-cache-dir .; fi".to_string(),
        PythonPackageManager::Poetry => "pip install --no-cache-dir poetry && poetry config virtualenvs.create false && poetry install --no-root --only main".to_string(),
        PythonPackageManager::Pipenv => "pip install --no-cache-dir pipenv && pipenv install --system --deploy".to_string(),
        PythonPackageManager::Uv => {
            df.push(Instruction::Env("UV_PROJECT_ENVIRONMENT".to_string(), "/usr/local".to_string()));
            "pip install --no-cache-dir uv && uv sync --frozen --no-dev".to_string()
        }
    };
    df.push(Instruction::Run(install));

    let module = params.entry.module_path();
    let cmd = match run_app_as {
        PythonRunMode::Script => match &params.entry.handler {
            Some(handler) => vec![
                "python".to_string(),
                "-c".to_string(),
                format!("from {} import {}; {}()", module, handler, handler),
            ],
            None => vec!["python".to_string(), params.entry.entryfile_path.clone()],
        },
        PythonRunMode::Asgi => {
            df.push(Instruction::Run("pip install --no-cache-dir uvicorn".to_string()));
            let app = params.entry.handler.as_deref().unwrap_or("app");
            vec![
                "uvicorn".to_string(),
                format!("{}:{}", module, app),
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                PYTHON_APP_PORT.to_string(),
            ]
        }
        PythonRunMode::Wsgi => {
            df.push(Instruction::Run("pip install --no-cache-dir gunicorn".to_string()));
            let app = params.entry.handler.as_deref().unwrap_or("app");
            vec![
                "gunicorn".to_string(),
                "--bind".to_string(),
                format!("0.0.0.0:{}", PYTHON_APP_PORT),
                format!("{}:{}", module, app),
            ]
        }
    };
    if run_app_as != PythonRunMode::Script {
        df.push(Instruction::Expose(PYTHON_APP_PORT.to_string()));
    }
    df.run_custom(params.custom_build_commands);
    df.push(Instruction::Cmd(cmd));
    df
}

fn node(params: &DockerfileParams<'_>, package_manager: JsPackageManager) -> Dockerfile {
    let mut df = Dockerfile::default();
    df.push(Instruction::From(runtime_base_image(
        Language::Javascript,
        params.version,
        params.requires_glibc,
    )))
    .push(Instruction::Workdir("/app".to_string()))
    .push(Instruction::Env("NODE_ENV".to_string(), "production".to_string()))
    .push(Instruction::Copy(".".to_string(), ".".to_string()));

    let install = match package_manager {
        JsPackageManager::Npm => "if [ -f package-lock.json ]; then npm ci --omit=dev; elif [ -f package.json ]; then npm install --omit=dev; fi",
        JsPackageManager::Yarn => "corepack enable && yarn install --production --frozen-lockfile",
        JsPackageManager::Pnpm => "corepack enable && pnpm install --prod --frozen-lockfile",
        JsPackageManager::Bun => "npm install -g bun && bun install --production",
    };
    df.push(Instruction::Run(install.to_string()));
    df.run_custom(params.custom_build_commands);

    let entry = params.entry.entryfile_path.clone();
    let cmd = match params.entry.extension() {
        Some("ts" | "mts" | "cts" | "tsx") => {
            vec!["npx".to_string(), "--yes".to_string(), "tsx".to_string(), entry]
        }
        _ => vec!["node".to_string(), entry],
    };
    df.push(Instruction::Cmd(cmd));
    df
}

fn java(params: &DockerfileParams<'_>, build_tool: JavaBuildTool) -> Dockerfile {
    let (builder, build, jar_glob) = match build_tool {
        JavaBuildTool::Gradle => (
            format!("gradle:8-jdk{}", params.version),
            "gradle build -x test --no-daemon",
            "build/libs",
        ),
        JavaBuildTool::Maven => (
            format!("maven:3.9-eclipse-temurin-{}", params.version),
            "mvn -B -DskipTests package",
            "target",
        ),
    };

    let mut df = Dockerfile::default();
    df.push(Instruction::FromAs(builder, "build".to_string()))
        .push(Instruction::Workdir("/src".to_string()))
        .push(Instruction::Copy(".".to_string(), ".".to_string()))
        .push(Instruction::Run(build.to_string()))
        // Gradle also emits a `-plain.jar` without dependencies
        .push(Instruction::Run(format!(
            "find {} -name '*.jar' ! -name '*-plain.jar' | head -n 1 | xargs -I{{}} cp {{}} /src/app.jar",
            jar_glob
        )))
        .push(Instruction::From(runtime_base_image(
            Language::Java,
            params.version,
            params.requires_glibc,
        )))
        .push(Instruction::Workdir("/app".to_string()))
        .push(Instruction::CopyFrom(
            "build".to_string(),
            "/src/app.jar".to_string(),
            "/app/app.jar".to_string(),
        ));
    df.run_custom(params.custom_build_commands);
    df.push(Instruction::Cmd(vec![
        "java".to_string(),
        "-jar".to_string(),
        "/app/app.jar".to_string(),
    ]));
    df
}

fn go(params: &DockerfileParams<'_>, ldflags: Option<&str>) -> Dockerfile {
    let builder = if params.requires_glibc {
        format!("golang:{}-bookworm", params.version)
    } else {
        format!("golang:{}-alpine", params.version)
    };
    let package = match params.entry.entryfile_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("./{}", dir.trim_start_matches("./")),
        _ => ".".to_string(),
    };
    let ldflags = match ldflags {
        Some(flags) => format!(" -ldflags \"{}\"", flags.replace('"', "\\\"")),
        None => String::new(),
    };
    let cgo = if params.requires_glibc { "1" } else { "0" };

    let mut df = Dockerfile::default();
    df.push(Instruction::FromAs(builder, "build".to_string()))
        .push(Instruction::Workdir("/src".to_string()))
        .push(Instruction::Copy("go.*".to_string(), "./".to_string()))
        .push(Instruction::Run("go mod download".to_string()))
        .push(Instruction::Copy(".".to_string(), ".".to_string()))
        .push(Instruction::Env("CGO_ENABLED".to_string(), cgo.to_string()))
        .push(Instruction::Run(format!("go build{} -o /out/app {}", ldflags, package)))
        .push(Instruction::From(runtime_base_image(
            Language::Go,
            params.version,
            params.requires_glibc,
        )));
    if !params.requires_glibc {
        df.push(Instruction::Run("apk add --no-cache ca-certificates".to_string()));
    }
    df.push(Instruction::Workdir("/app".to_string()))
        .push(Instruction::CopyFrom(
            "build".to_string(),
            "/out/app".to_string(),
            "/app/app".to_string(),
        ));
    df.run_custom(params.custom_build_commands);
    df.push(Instruction::Cmd(vec!["/app/app".to_string()]));
    df
}
