/// Built-in parameter telling whether the invocation runs on a build server.
pub const IS_SERVER_BUILD_PARAM: &str = "IsServerBuild";

/// Built-in parameter naming the build server kind (for example `github-actions`).
pub const BUILD_SERVER_PARAM: &str = "BuildServer";

/// Suffix of the parameter holding a partitioned target's current shard.
pub const PARTITION_PARAM_SUFFIX: &str = "Partition";
