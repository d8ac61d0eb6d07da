//! Integration tests for DataSourceProperties
//!
//! Covers the three property sources (flat maps, TOML documents and
//! environment variables), their precedence, and the conversion into pool
//! and session factory settings.

use std::collections::BTreeMap;
use std::time::Duration;

use minidruid_pool::{DEFAULT_MAPPER_LOCATION, DataSourceProperties, MiniDruidError};
use pretty_assertions::assert_eq;

fn props(pairs: &[(&str, &str)]) -> DataSourceProperties {
    DataSourceProperties::from_properties(pairs.iter().copied()).expect("valid properties")
}

// ============ Flat property maps ============

#[test]
fn reads_prefixed_kebab_case_keys() {
    let props = props(&[
        ("spring.druid.datasource.url", "jdbc:mysql://db:3306/app"),
        ("spring.druid.datasource.username", "app"),
        ("spring.druid.datasource.password", "secret"),
        ("spring.druid.datasource.max-active", "20"),
        ("spring.druid.datasource.initial-size", "2"),
        ("spring.druid.datasource.min-idle", "5"),
        ("spring.druid.datasource.max-wait", "60000"),
        ("spring.druid.datasource.test-on-borrow", "true"),
        ("server.port", "8080"),
    ]);

    assert_eq!(props.url.as_deref(), Some("jdbc:mysql://db:3306/app"));
    assert_eq!(props.username.as_deref(), Some("app"));
    assert_eq!(props.max_active, Some(20));
    assert_eq!(props.initial_size, Some(2));
    assert_eq!(props.min_idle, Some(5));
    assert_eq!(props.max_wait, Some(60000));
    assert_eq!(props.test_on_borrow, Some(true));
    assert!(props.is_configured());
}

#[test]
fn accepts_camel_and_snake_case_keys() {
    let props = props(&[
        ("spring.druid.datasource.maxActive", "7"),
        ("spring.druid.datasource.timeBetweenEvictionRunsMillis", "30000"),
        ("spring.druid.datasource.min_evictable_idle_time_millis", "600000"),
        ("spring.druid.datasource.pwdPublicKey", "KEY"),
        ("spring.druid.datasource.mybatisMapperLocations", "classpath:mapper/*.xml"),
    ]);

    assert_eq!(props.max_active, Some(7));
    assert_eq!(props.time_between_eviction_runs_millis, Some(30000));
    assert_eq!(props.min_evictable_idle_time_millis, Some(600000));
    assert_eq!(props.pwd_public_key.as_deref(), Some("KEY"));
    assert_eq!(
        props.mybatis_mapper_locations.as_deref(),
        Some("classpath:mapper/*.xml")
    );
}

#[test]
fn rejects_unparseable_values() {
    let result = DataSourceProperties::from_properties([(
        "spring.druid.datasource.max-active",
        "lots",
    )]);
    assert!(matches!(result, Err(MiniDruidError::Config(_))));

    let result = DataSourceProperties::from_properties([(
        "spring.druid.datasource.test-on-borrow",
        "yes please",
    )]);
    assert!(matches!(result, Err(MiniDruidError::Config(_))));
}

#[test]
fn ignores_unknown_properties() {
    let props = props(&[("spring.druid.datasource.filters", "stat,wall")]);
    assert_eq!(props, DataSourceProperties::default());
}

// ============ TOML documents ============

#[test]
fn reads_nested_toml_tables() {
    let document = r#"
        [server]
        port = 8080

        [spring.druid.datasource]
        url = "mysql://db:3306/app"
        username = "app"
        max-active = 12
        min-idle = 2
        test-while-idle = false
        validation-query = "SELECT 1"
        validation-query-timeout = 3

        [spring.druid.datasource.connection-properties]
        useSSL = "false"
        connectTimeout = 500
    "#;

    let props = DataSourceProperties::from_toml_str(document).unwrap();
    assert_eq!(props.max_active, Some(12));
    assert_eq!(props.min_idle, Some(2));
    assert_eq!(props.test_while_idle, Some(false));
    assert_eq!(props.validation_query_timeout, Some(3));

    let config = props.to_pool_config().unwrap().expect("url is set");
    assert_eq!(config.validation_query(), Some("SELECT 1"));
    assert_eq!(
        config.validation_query_timeout(),
        Some(Duration::from_secs(3))
    );

    let expected: BTreeMap<String, String> = [
        ("connectTimeout".to_string(), "500".to_string()),
        ("useSSL".to_string(), "false".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(config.connection_properties(), &expected);
}

#[test]
fn reads_dotted_toml_keys() {
    let document = r#"
        spring.druid.datasource.url = "postgres://db/app"
        spring.druid.datasource.enable-monitor = true
        spring.druid.datasource.slow-sql-millis = 500
    "#;

    let props = DataSourceProperties::from_toml_str(document).unwrap();
    assert_eq!(props.url.as_deref(), Some("postgres://db/app"));
    assert_eq!(props.enable_monitor, Some(true));
    assert_eq!(props.slow_sql_millis, Some(500));
}

#[test]
fn toml_without_section_is_empty() {
    let props = DataSourceProperties::from_toml_str("[server]\nport = 8080\n").unwrap();
    assert!(!props.is_configured());
    assert!(props.to_pool_config().unwrap().is_none());
}

#[test]
fn invalid_toml_is_config_error() {
    assert!(matches!(
        DataSourceProperties::from_toml_str("spring.druid = ["),
        Err(MiniDruidError::Config(_))
    ));
}

// ============ Environment variables ============

#[test]
fn reads_environment_variables() {
    let vars = [
        ("SPRING_DRUID_DATASOURCE_URL", "mysql://db/app"),
        ("SPRING_DRUID_DATASOURCE_MAX_ACTIVE", "3"),
        ("SPRING_DRUID_DATASOURCE_LOG_SLOW_SQL", "true"),
        ("PATH", "/usr/bin"),
    ];
    let props = DataSourceProperties::from_env_vars(vars).unwrap();

    assert_eq!(props.url.as_deref(), Some("mysql://db/app"));
    assert_eq!(props.max_active, Some(3));
    assert_eq!(props.log_slow_sql, Some(true));
}

#[test]
fn later_sources_override_earlier_ones() {
    let file = props(&[
        ("spring.druid.datasource.url", "mysql://file/app"),
        ("spring.druid.datasource.max-active", "10"),
        ("spring.druid.datasource.min-idle", "2"),
    ]);
    let env = DataSourceProperties::from_env_vars([(
        "SPRING_DRUID_DATASOURCE_MAX_ACTIVE",
        "4",
    )])
    .unwrap();

    let merged = file.merge(env);
    assert_eq!(merged.url.as_deref(), Some("mysql://file/app"));
    assert_eq!(merged.max_active, Some(4));
    assert_eq!(merged.min_idle, Some(2));
}

// ============ Conversion ============

#[test]
fn converts_into_pool_config() {
    let props = props(&[
        ("spring.druid.datasource.name", "orders"),
        ("spring.druid.datasource.url", "mysql://db/app"),
        ("spring.druid.datasource.username", "app"),
        ("spring.druid.datasource.password", "secret"),
        ("spring.druid.datasource.max-active", "6"),
        ("spring.druid.datasource.min-idle", "2"),
        ("spring.druid.datasource.initial-size", "1"),
        ("spring.druid.datasource.max-wait", "250"),
        ("spring.druid.datasource.max-open-prepared-statements", "20"),
        ("spring.druid.datasource.enable-monitor", "true"),
        ("spring.druid.datasource.merge-sql", "true"),
        ("spring.druid.datasource.slow-sql-millis", "1500"),
        ("spring.druid.datasource.slow-sql-capacity", "50"),
        ("spring.druid.datasource.connection-properties", "useSSL=false; charset=utf8"),
    ]);

    let config = props.to_pool_config().unwrap().expect("url is set");
    assert!(config.validate().is_ok());
    assert_eq!(config.name(), "orders");
    assert_eq!(config.password(), "secret");
    assert_eq!(config.max_active(), 6);
    assert_eq!(config.min_idle(), 2);
    assert_eq!(config.initial_size(), 1);
    assert_eq!(config.max_wait(), Some(Duration::from_millis(250)));
    assert!(config.pool_prepared_statements());
    assert_eq!(config.max_open_prepared_statements(), 20);
    assert!(config.monitoring_enabled());
    assert!(config.merge_sql());
    assert_eq!(config.slow_sql_threshold_millis(), 1500);
    assert_eq!(config.slow_sql_capacity(), 50);
    assert_eq!(
        config.connection_properties().get("charset").map(String::as_str),
        Some("utf8")
    );
}

#[test]
fn malformed_connection_properties_are_rejected() {
    let props = props(&[
        ("spring.druid.datasource.url", "mysql://db/app"),
        ("spring.druid.datasource.connection-properties", "useSSL"),
    ]);
    assert!(matches!(
        props.to_pool_config(),
        Err(MiniDruidError::Config(_))
    ));
}

#[test]
fn blank_url_is_not_configured() {
    let props = props(&[("spring.druid.datasource.url", "  ")]);
    assert!(!props.is_configured());
    assert!(props.to_pool_config().unwrap().is_none());
}

#[test]
fn session_factory_defaults_mapper_location() {
    let session = DataSourceProperties::default().session_factory_config();
    assert_eq!(session.mapper_locations(), DEFAULT_MAPPER_LOCATION);
    assert!(session.map_underscore_to_camel_case());

    let session = props(&[(
        "spring.druid.datasource.mybatis-mapper-locations",
        "classpath*:mapper/*.xml",
    )])
    .session_factory_config();
    assert_eq!(session.mapper_locations(), "classpath*:mapper/*.xml");
}

#[test]
fn debug_output_hides_password() {
    let props = props(&[
        ("spring.druid.datasource.url", "mysql://app:hunter2@db/app"),
        ("spring.druid.datasource.password", "hunter2"),
    ]);
    let debug = format!("{:?}", props);
    assert!(!debug.contains("hunter2"));
}
