//! Integration tests for autobuild

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn autobuild() -> Command {
        cargo_bin_cmd!("autobuild")
    }

    #[test]
    fn help_displays() {
        autobuild()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build orchestration"));
    }

    #[test]
    fn version_displays() {
        autobuild()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("autobuild"));
    }

    #[test]
    fn config_path_honors_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        autobuild()
            .arg("--config")
            .arg(&path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let temp = TempDir::new().unwrap();
        autobuild()
            .arg("--config")
            .arg(temp.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[toolchain]"))
            .stdout(predicate::str::contains("make = \"make\""));
    }

    #[test]
    fn config_init_writes_file_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        autobuild()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.is_file());

        autobuild()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[build]\njobs = \"many\"\n").unwrap();

        autobuild()
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn settings_from_editorconfig() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".editorconfig"),
            "root = true\n[*.c]\nindent_style = tab\nmax_line_length = 100\n",
        )
        .unwrap();

        autobuild()
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("settings")
            .arg(temp.path().join("main.c"))
            .assert()
            .success()
            .stdout(predicate::str::contains("indent_style: tabs"))
            .stdout(predicate::str::contains("right_margin_position: 100"));

        autobuild()
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .args(["settings", "--json"])
            .arg(temp.path().join("README.md"))
            .assert()
            .success()
            .stdout(predicate::str::contains("\"indent_style\": null"));
    }

    #[test]
    fn unknown_configuration_fails() {
        let temp = TempDir::new().unwrap();
        autobuild()
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--project")
            .arg(temp.path())
            .args(["-C", "nope", "build"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Build configuration not found: nope"));
    }

    #[test]
    fn simple_project_builds_immediately() {
        let temp = TempDir::new().unwrap();
        autobuild()
            .arg("--config")
            .arg(temp.path().join("config.toml"))
            .arg("--project")
            .arg(temp.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build successful"));
    }
}

#[cfg(unix)]
mod autotools_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use autobuild::project::host_system_type;
    use predicates::prelude::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn script(path: &Path, body: &str) {
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    struct Project {
        temp: TempDir,
        source: PathBuf,
        config: PathBuf,
        log: PathBuf,
    }

    impl Project {
        fn command(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("autobuild");
            cmd.arg("--config")
                .arg(&self.config)
                .arg("--project")
                .arg(&self.source);
            cmd
        }

        fn log(&self) -> Vec<String> {
            std::fs::read_to_string(&self.log)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn build_dir(&self) -> PathBuf {
            self.temp
                .path()
                .join("builds")
                .join("calc")
                .join("local")
                .join(host_system_type())
        }
    }

    /// An autotools project whose toolchain is shell scripts logging
    /// their invocations
    fn project() -> Project {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("calc-src");
        let bin = temp.path().join("bin");
        let log = temp.path().join("log");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(&log, "").unwrap();

        std::fs::write(source.join("configure.ac"), "AC_INIT([calc], [1.0])\n").unwrap();
        std::fs::write(
            source.join("autobuild.toml"),
            "[project]\nid = \"calc\"\n\n\
             [[configuration]]\nid = \"debug\"\nprefix = \"/opt/calc\"\n",
        )
        .unwrap();

        script(
            &source.join("autogen.sh"),
            &format!(
                "echo \"autogen NOCONFIGURE=$NOCONFIGURE\" >> {log}\n\
                 cat > configure <<'EOF'\n#!/bin/sh\n\
                 echo \"configure $*\" >> {log}\n\
                 printf 'CFLAGS = -O2\\n' > Makefile\nEOF\n\
                 chmod +x configure",
                log = log.display()
            ),
        );
        script(
            &bin.join("make"),
            &format!(
                "echo \"make $*\" >> {log}\n\
                 if [ \"$1\" = \"-p\" ]; then\n\
                 echo '# Make data base'\n\
                 echo '# Variables'\n\
                 echo \"abs_srcdir = {src}\"\n\
                 echo 'AM_CFLAGS = -Wall'\n\
                 echo 'CFLAGS = -O2'\n\
                 echo 'bindir = /usr/bin'\n\
                 echo 'bin_PROGRAMS = calc'\n\
                 echo 'calc_SOURCES = main.c'\n\
                 fi\n\
                 [ -z \"$FAIL_MAKE\" ] || exit 2",
                log = log.display(),
                src = source.display()
            ),
        );

        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[build]\nroot_build_dir = \"{}\"\njobs = 2\n\n[toolchain]\nmake = \"{}\"\n",
                temp.path().join("builds").display(),
                bin.join("make").display()
            ),
        )
        .unwrap();

        Project {
            temp,
            source,
            config,
            log,
        }
    }

    #[test]
    fn build_bootstraps_configures_and_makes_out_of_tree() {
        let project = project();

        project
            .command()
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build successful"));

        assert_eq!(
            project.log(),
            vec![
                "autogen NOCONFIGURE=1".to_string(),
                "configure --prefix=/opt/calc".to_string(),
                "make -j2".to_string(),
            ]
        );
        assert!(project.build_dir().join("Makefile").is_file());
    }

    #[test]
    fn install_runs_install_target() {
        let project = project();

        project
            .command()
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("Install successful"));

        assert_eq!(project.log().last().unwrap(), "make -j2 install");
    }

    #[test]
    fn failing_make_reports_stage() {
        let project = project();

        project
            .command()
            .env("FAIL_MAKE", "1")
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Build failed"));
    }

    #[test]
    fn flags_are_read_from_make_database() {
        let project = project();

        project
            .command()
            .args(["flags", "--json"])
            .arg(project.source.join("main.c"))
            .assert()
            .success()
            .stdout(predicate::str::diff("[\"-Wall\",\"-O2\"]\n"));

        let log = project.log();
        assert!(log.iter().any(|l| l.starts_with("configure")));
        assert!(log.iter().any(|l| l.starts_with("make -p")));
        assert!(log.iter().all(|l| l != "make -j2"));
    }

    #[test]
    fn targets_are_listed() {
        let project = project();

        project
            .command()
            .arg("targets")
            .assert()
            .success()
            .stdout(predicate::str::contains("calc"))
            .stdout(predicate::str::contains("program"))
            .stdout(predicate::str::contains("/usr/bin"));
    }
}
