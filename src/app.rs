//! Main application orchestration and execution

use crate::{
    analysis::{
        self,
        iperf::summarize_iperf,
        qdisc::{fifo_delay_over_runs, DualqSeries, FifoRunsOptions, FifoSeries, QdiscParser},
        rlc::{aggregate_runs, parse_run, RlcReport},
        ss::{summarize_srtt, SrttParser},
    },
    cli::{Cli, Commands, MonitorArgs, ProbeKind, QdiscCommand, RangeArgs, RlcArgs, ServerArgs, TrafficArgs},
    config::{display_config_summary, load_config, validate_config, ConfigValidator, ValidationLevel},
    error::{AppError, ErrorContext, Result},
    experiment::{ExperimentPlan, ExperimentRunner},
    logging::Logger,
    models::{flows::parse_labels, Config, FlowLabel, RunRange},
    monitor::{CommandProbe, Monitor, MonitorConfig},
    output::{OutputFormatter, OutputFormatterFactory, TableFormat},
    traffic::{CongestionControl, FlowSpec, IperfClient, IperfServer},
};
use std::path::Path;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
    config: Config,
    logger: Logger,
    formatter: Box<dyn OutputFormatter>,
}

impl App {
    /// Load configuration and set up logging and output for `cli`
    pub fn new(cli: Cli) -> Result<Self> {
        cli.validate().map_err(AppError::usage)?;

        let config = load_config(cli.clone())?;
        let logger = Logger::with_config("APP".to_string(), &config);
        let formatter = OutputFormatterFactory::create_formatter(config.enable_color, config.verbose);

        Ok(Self {
            cli,
            config,
            logger,
            formatter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the selected subcommand
    pub async fn run(self) -> Result<()> {
        if self.cli.should_show_topic_help() {
            println!("{}", self.cli.display_help());
            return Ok(());
        }

        if self.config.debug {
            eprintln!("{}", crate::build_info());
            eprintln!("{}", self.cli.get_config_summary());
            eprintln!("{}", display_config_summary(&self.config));
        }

        for warning in validate_config(&self.config)? {
            let log = match warning.level {
                ValidationLevel::Info => self.logger.info(&warning.message),
                ValidationLevel::Warning | ValidationLevel::Error => self.logger.warn(&warning.message),
            };
            log.field("check", "config").log().await;
        }

        let command_name = self.cli.command_name();
        let correlation_id = self.logger.start_operation(command_name).await;
        let result = self.dispatch().await;
        self.logger.end_operation(&correlation_id, command_name, result.is_ok()).await;
        result
    }

    async fn dispatch(&self) -> Result<()> {
        let Some(command) = &self.cli.command else {
            return Err(AppError::usage("A subcommand is required"));
        };

        match command {
            Commands::Monitor(args) => self.monitor(args).await,
            Commands::Traffic(args) => self.traffic(args).await,
            Commands::Server(args) => self.server(args).await,
            Commands::Run { plan } => self.run_plan(plan).await,
            Commands::IperfCsv(range) => self.iperf_csv(range),
            Commands::SsCsv(range) => self.ss_csv(range),
            Commands::Qdisc(QdiscCommand::Dualq { file, csv }) => self.dualq(file, csv.as_deref()),
            Commands::Qdisc(QdiscCommand::Fifo { file, link_mbps, csv }) => {
                self.fifo(file, link_mbps.unwrap_or(self.config.link_mbps), csv.as_deref())
            }
            Commands::Qdisc(QdiscCommand::FifoRuns { start, end, link_mbps }) => {
                self.fifo_runs(RunRange::new(*start, *end)?, *link_mbps)
            }
            Commands::Rlc(args) => self.rlc(args),
        }
    }

    async fn monitor(&self, args: &MonitorArgs) -> Result<()> {
        let config = MonitorConfig::from_secs(args.interval_secs, args.duration_secs, args.effective_layout())?;
        let probe = match args.kind {
            ProbeKind::Qdisc => CommandProbe::qdisc(&self.config.tc_bin, &args.iface),
            ProbeKind::Sockets => CommandProbe::sockets(&self.config.ss_bin, &args.filter),
        };

        for warning in ConfigValidator::validate_monitor_interval(args.interval_secs, args.duration_secs) {
            self.logger.warn(&warning.message).log().await;
        }

        let logger = self.logger.child("MONITOR");
        logger
            .info("Starting monitor")
            .field("program", probe.program())
            .field("interval_secs", args.interval_secs)
            .field("duration_secs", args.duration_secs)
            .log()
            .await;

        let monitor = Monitor::new(probe, config);
        let report = match &args.output {
            Some(path) => monitor.run_to_file(path).await?,
            None => monitor.run(&mut std::io::stdout()).await?,
        };

        logger
            .info("Monitor finished")
            .field("samples", report.samples)
            .field("elapsed_secs", report.elapsed.as_secs_f64())
            .log()
            .await;

        // stdout may be the log itself
        if let Some(path) = &args.output {
            eprintln!("{}", self.formatter.format_saved(&format!("{} samples", report.samples), path)?);
        }
        Ok(())
    }

    async fn traffic(&self, args: &TrafficArgs) -> Result<()> {
        let label = FlowLabel::new(args.label.clone())?;
        let congestion: CongestionControl = args.cc.parse()?;

        let mut spec = FlowSpec::new(label, &args.server, congestion);
        spec.port = args.port;
        spec.flows = args.flows;
        spec.duration_secs = args.duration;
        spec.bind = args.bind.clone();
        spec.validate()?;

        let json_path = match &args.output {
            Some(path) => path.clone(),
            None => self.config.output_dir.join(format!("{}.json", spec.label)),
        };
        if let Some(parent) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }

        self.logger
            .child("TRAFFIC")
            .info("Starting iperf3 client")
            .field("label", spec.label.as_str())
            .field("args", spec.client_args())
            .log()
            .await;

        let outcome = IperfClient::new(self.config.iperf_bin.clone()).run(&spec, &json_path).await?;
        println!(
            "{}",
            self.formatter.format_success(&format!(
                "Flow {} finished in {:.1}s",
                outcome.label,
                outcome.elapsed.as_secs_f64()
            ))?
        );
        println!("{}", self.formatter.format_saved("iperf3 report", &outcome.json_path)?);
        Ok(())
    }

    async fn server(&self, args: &ServerArgs) -> Result<()> {
        let server = IperfServer {
            port: args.port,
            one_off: !args.persistent,
            daemon: !args.foreground,
        };

        self.logger
            .child("TRAFFIC")
            .info("Starting iperf3 server")
            .field("args", server.args())
            .log()
            .await;

        server.start(&self.config.iperf_bin).await?;
        if server.daemon {
            println!(
                "{}",
                self.formatter.format_success(&format!("iperf3 server listening on port {}", server.port))?
            );
        }
        Ok(())
    }

    async fn run_plan(&self, plan_path: &Path) -> Result<()> {
        let plan = ExperimentPlan::load(plan_path)?;
        let runner = ExperimentRunner::new(plan, &self.config, &self.logger)?;

        println!("{}", self.formatter.format_header(&format!("Experiment plan {}", plan_path.display()))?);

        let reports = tokio::select! {
            reports = runner.run_all() => reports?,
            _ = tokio::signal::ctrl_c() => {
                return Err(AppError::internal("Interrupted; the current iteration was aborted"));
            }
        };

        let mut failed = 0;
        for report in &reports {
            println!("{}", self.formatter.format_iteration(report)?);
            if !report.is_success() {
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(AppError::command(format!(
                "{} of {} iterations had failed jobs",
                failed,
                reports.len()
            )));
        }

        println!(
            "{}",
            self.formatter
                .format_success(&format!("{} iterations written to {}", reports.len(), runner.output_dir().display()))?
        );
        Ok(())
    }

    fn labels(&self) -> Result<Vec<FlowLabel>> {
        parse_labels(&self.config.flow_labels)
    }

    fn warn_all(&self, warnings: &[String]) -> Result<()> {
        for warning in warnings {
            eprintln!("{}", self.formatter.format_warning(warning)?);
        }
        Ok(())
    }

    fn iperf_csv(&self, args: &RangeArgs) -> Result<()> {
        let range = RunRange::new(args.start, args.end)?;
        let summary = summarize_iperf(&self.config.output_dir, range, &self.labels()?)?;
        self.warn_all(&summary.warnings)?;

        if summary.files_read == 0 {
            eprintln!(
                "{}",
                self.formatter.format_warning(&format!(
                    "No iperf3 reports found for runs {}-{} in {}",
                    range.start,
                    range.end,
                    self.config.output_dir.display()
                ))?
            );
        }

        let rows: Vec<Vec<String>> = summary
            .multi_ue
            .iter()
            .map(|row| {
                vec![
                    row.family.clone(),
                    row.ue.clone(),
                    format!("{:.2}", row.mean_mbps),
                    format!("{:.2}", row.std_mbps),
                    row.count.to_string(),
                ]
            })
            .collect();
        let format = TableFormat::numeric(&["Type", "UE", "Mean Mbps", "Std Mbps", "Count"]);
        println!("{}", self.formatter.format_table(&format, &rows)?);

        let (flows, multi_ue) = summary.write(&self.config.output_dir, &args.prefix)?;
        println!("{}", self.formatter.format_saved("per-flow throughput", &flows)?);
        println!("{}", self.formatter.format_saved("multi-UE summary", &multi_ue)?);
        Ok(())
    }

    fn ss_csv(&self, args: &RangeArgs) -> Result<()> {
        let range = RunRange::new(args.start, args.end)?;
        let parser = SrttParser::new(&self.config.excluded_fds)?;
        let summary = summarize_srtt(&self.config.output_dir, range, &self.labels()?, &parser)?;

        if summary.files_read == 0 {
            eprintln!(
                "{}",
                self.formatter.format_warning(&format!(
                    "No ss logs found for runs {}-{} in {}",
                    range.start,
                    range.end,
                    self.config.output_dir.display()
                ))?
            );
        }

        let path = summary.write(&self.config.output_dir, &args.prefix)?;
        println!(
            "{}",
            self.formatter
                .format_saved(&format!("{} SRTT rows from {} files", summary.rows.len(), summary.files_read), &path)?
        );
        Ok(())
    }

    fn dualq(&self, file: &Path, csv: Option<&Path>) -> Result<()> {
        let parser = QdiscParser::new()?;
        let samples = parser.parse_dualq(analysis::open_required(file)?)?;
        let series = DualqSeries::from_samples(&samples);
        if series.is_empty() {
            return Err(AppError::analysis(format!("No valid data in {}", file.display())));
        }

        let summary = series.summary();
        println!("{}", self.formatter.format_header("DualPI2 queue delay")?);
        println!("{}", self.formatter.format_metric("Classic Delay", &summary.classic_ms, " ms", 3)?);
        println!("{}", self.formatter.format_metric("L4S Delay", &summary.l4s_ms, " ms", 3)?);

        if let Some(path) = csv {
            series.write_csv(path)?;
            println!("{}", self.formatter.format_saved("delay time series", path)?);
        }
        Ok(())
    }

    fn fifo(&self, file: &Path, link_mbps: f64, csv: Option<&Path>) -> Result<()> {
        let parser = QdiscParser::new()?;
        let samples = parser.parse_fifo(analysis::open_required(file)?)?;
        let series = FifoSeries::from_samples(&samples, link_mbps)?;
        if series.is_empty() {
            return Err(AppError::analysis(format!("No valid data in {}", file.display())));
        }

        let summary = series.summary();
        println!("{}", self.formatter.format_header(&format!("FIFO queue at {} Mbps", link_mbps))?);
        println!("{}", self.formatter.format_metric("Backlog (pkts)", &summary.backlog_pkts, "", 2)?);
        println!("{}", self.formatter.format_metric("Drops", &summary.drops, "", 2)?);
        println!("{}", self.formatter.format_metric("Delay", &summary.delay_s, " s", 4)?);

        if let Some(path) = csv {
            series.write_csv(path)?;
            println!("{}", self.formatter.format_saved("FIFO time series", path)?);
        }
        Ok(())
    }

    fn fifo_runs(&self, range: RunRange, link_mbps: f64) -> Result<()> {
        let options = FifoRunsOptions {
            link_mbps,
            cap_secs: self.config.delay_cap_secs,
            warmup_secs: self.config.warmup_secs,
        };
        let report = fifo_delay_over_runs(&self.config.output_dir, range, options, &QdiscParser::new()?)?;
        self.warn_all(&report.warnings)?;

        if report.delay_s.is_empty() {
            return Err(AppError::analysis(format!(
                "No FIFO delay samples for runs {}-{} in {}",
                range.start,
                range.end,
                self.config.output_dir.display()
            )));
        }

        println!(
            "{}",
            self.formatter
                .format_header(&format!("FIFO delay over runs {}-{} ({} files)", range.start, range.end, report.files_read))?
        );
        println!("{}", self.formatter.format_metric("Delay", &report.delay_s, " s", 6)?);
        Ok(())
    }

    fn rlc(&self, args: &RlcArgs) -> Result<()> {
        let warmup = args.warmup.unwrap_or(self.config.warmup_secs);
        let dir = &self.config.output_dir;

        let (title, report) = match args.end {
            Some(end) => {
                let range = RunRange::new(args.start, end)?;
                (
                    format!("RLC buffer over runs {}-{}", range.start, range.end),
                    aggregate_runs(dir, range, args.sliced, warmup)?,
                )
            }
            None => {
                let log = parse_run(dir, args.start, args.sliced)?;
                (format!("RLC buffer in run {}", args.start), RlcReport::from_log(&log, warmup))
            }
        };
        self.warn_all(&report.warnings)?;

        if report.ues.is_empty() {
            return Err(AppError::analysis("No RLC buffer lines found"));
        }

        println!("{}", self.formatter.format_header(&title)?);

        let format = TableFormat::numeric(&["UE", "RNTI", "Slice", "Samples", "Mean (B)", "After warm-up (B)"]);
        let rows: Vec<Vec<String>> = report
            .ues
            .iter()
            .map(|row| {
                vec![
                    row.ue.clone(),
                    row.rnti.map(|r| r.to_string()).unwrap_or_default(),
                    row.slice.map(|s| s.to_string()).unwrap_or_default(),
                    row.samples.to_string(),
                    format!("{:.2}", row.mean_bytes),
                    format!("{:.2}", row.mean_bytes_after_warmup),
                ]
            })
            .collect();
        println!("{}", self.formatter.format_table(&format, &rows)?);

        if !report.slices.is_empty() {
            let format = TableFormat::numeric(&["Slice", "Mean (B)", "After warm-up (B)"]);
            let rows: Vec<Vec<String>> = report
                .slices
                .iter()
                .map(|row| {
                    vec![
                        row.slice.to_string(),
                        format!("{:.2}", row.mean_bytes),
                        format!("{:.2}", row.mean_bytes_after_warmup),
                    ]
                })
                .collect();
            println!("{}", self.formatter.format_table(&format, &rows)?);
        }

        if args.end.is_none() && report.ues.len() > 1 {
            if let Some((lowest, others)) = report.lowest_ue() {
                println!(
                    "Lowest mean buffer: UE {} with {:.2} B; other UEs average {:.2} B",
                    lowest.ue, lowest.mean_bytes, others
                );
            }
        }

        if let Some(path) = &args.csv {
            report.write_csv(path)?;
            println!("{}", self.formatter.format_saved("RLC buffer rows", path)?);
        }
        Ok(())
    }
}
