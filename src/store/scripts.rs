//! Server-side Lua scripts backing the atomic store operations.

/// KEYS[1] = lock key, ARGV[1] = expected token
pub const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// KEYS[1] = lock key, ARGV[1] = expected token, ARGV[2] = additional ms
pub const COMPARE_AND_EXTEND: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
    return 0
end
local remaining = redis.call('PTTL', KEYS[1])
if remaining < 0 then
    remaining = 0
end
return redis.call('PEXPIRE', KEYS[1], remaining + tonumber(ARGV[2]))
"#;

/// KEYS[1] = window key, ARGV = now ms, window ms, limit, member
pub const SLIDING_WINDOW_ADMIT: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. (now - window))
local count = redis.call('ZCARD', KEYS[1])
if count >= limit then
    return 0
end
redis.call('ZADD', KEYS[1], now, ARGV[4])
redis.call('PEXPIRE', KEYS[1], window)
return 1
"#;
