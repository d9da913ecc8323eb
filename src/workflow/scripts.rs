// ABOUTME: Membership scripts run inside an etcd container during migration.
// ABOUTME: Each prints one status token on its last line for the judge step.

/// `$1` endpoints, `$2` member name, `$3` peer url. Prints SUCCESS or EXIST.
pub const ADD_MEMBER: &str = r#"set -e
export ETCDCTL_API=3
endpoints="$1"; name="$2"; peer_url="$3"
if etcdctl --endpoints="$endpoints" member list | grep -q -- "$peer_url"; then
    echo EXIST
    exit 0
fi
etcdctl --endpoints="$endpoints" member add "$name" --peer-urls="$peer_url" >/dev/null
echo SUCCESS
"#;

/// `$1` endpoints, `$2` member name. Prints SUCCESS or NOTEXIST.
pub const REMOVE_MEMBER: &str = r#"set -e
export ETCDCTL_API=3
endpoints="$1"; name="$2"
id=$(etcdctl --endpoints="$endpoints" member list | awk -F', ' -v n="$name" '$3 == n { print $1 }')
if [ -z "$id" ]; then
    echo NOTEXIST
    exit 0
fi
etcdctl --endpoints="$endpoints" member remove "$id" >/dev/null
echo SUCCESS
"#;

/// Last non-empty line of script output.
pub fn status_token(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
